//! Kubernetes-backed object stores
//!
//! [`KubeObjectStore`] implements [`ObjectStore`] for the crate's plain serde
//! resource types by converting them to and from the corresponding
//! k8s-openapi type through JSON. Writes are `replace` calls, so a stale
//! `resourceVersion` is rejected by the API server with 409 Conflict.

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::apply::ObjectStore;
use crate::workload::{self, ManagedObject};
use crate::{Error, FIELD_MANAGER};

/// Store for HorizontalPodAutoscalers
pub type HpaStore = KubeObjectStore<
    k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler,
    workload::HorizontalPodAutoscaler,
>;

/// Store for ConfigMaps
pub type ConfigMapStore =
    KubeObjectStore<k8s_openapi::api::core::v1::ConfigMap, workload::ConfigMap>;

/// [`ObjectStore`] over the API server for the API type `K`, exposed as `T`
pub struct KubeObjectStore<K, T> {
    client: Client,
    _types: PhantomData<fn() -> (K, T)>,
}

impl<K, T> KubeObjectStore<K, T> {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _types: PhantomData,
        }
    }
}

impl<K, T> KubeObjectStore<K, T>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// Convert between two serde representations of the same object
fn convert<S, D>(object: &S, kind: &str) -> Result<D, Error>
where
    S: Serialize,
    D: DeserializeOwned,
{
    let value = serde_json::to_value(object)
        .map_err(|e| Error::serialization_for(kind, format!("encode: {e}")))?;
    serde_json::from_value(value)
        .map_err(|e| Error::serialization_for(kind, format!("decode: {e}")))
}

#[async_trait]
impl<K, T> ObjectStore<T> for KubeObjectStore<K, T>
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default,
    T: ManagedObject + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<T>, Error> {
        trace!(kind = T::KIND, namespace, name, "get");
        match self.api(namespace).get_opt(name).await? {
            Some(live) => Ok(Some(convert(&live, T::KIND)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, object: &T) -> Result<T, Error> {
        let meta = object.metadata();
        trace!(kind = T::KIND, name = %meta.key(), "create");
        let resource: K = convert(object, T::KIND)?;
        let created = self
            .api(&meta.namespace)
            .create(&post_params(), &resource)
            .await?;
        convert(&created, T::KIND)
    }

    async fn update(&self, object: &T) -> Result<T, Error> {
        let meta = object.metadata();
        trace!(
            kind = T::KIND,
            name = %meta.key(),
            resource_version = ?meta.resource_version,
            "replace"
        );
        let resource: K = convert(object, T::KIND)?;
        let replaced = self
            .api(&meta.namespace)
            .replace(&meta.name, &post_params(), &resource)
            .await?;
        convert(&replaced, T::KIND)
    }
}
