//! Shared fixtures for the autoscaling integration tests
//!
//! [`MemoryStore`] behaves like the API server for the operations the
//! controller uses: every write bumps a `resourceVersion`, a replace with a
//! stale version fails with a conflict, and creating an existing object fails
//! with a conflict.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use tokio::sync::Barrier;

use app_autoscaler::apply::ObjectStore;
use app_autoscaler::controller::{Context, ControllerConfig};
use app_autoscaler::crd::{Application, ApplicationSpec, AutoscalingSpec, Component, ComponentTraits};
use app_autoscaler::events::EventPublisher;
use app_autoscaler::workload::{ConfigMap, HorizontalPodAutoscaler, ManagedObject};
use app_autoscaler::Error;

/// Holds the first `parties` reads until all of them have read, forcing
/// concurrent writers to start from the same version
struct ReadGate {
    barrier: Barrier,
    parties: usize,
    reads: AtomicUsize,
}

/// In-memory object store with optimistic concurrency
pub struct MemoryStore<T> {
    objects: Mutex<BTreeMap<(String, String), T>>,
    version: AtomicU64,
    gate: Option<ReadGate>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    conflicts: AtomicUsize,
}

impl<T: ManagedObject + Clone> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            gate: None,
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
        }
    }

    /// Store whose first `parties` reads rendezvous before returning
    pub fn with_read_gate(parties: usize) -> Self {
        Self {
            gate: Some(ReadGate {
                barrier: Barrier::new(parties),
                parties,
                reads: AtomicUsize::new(0),
            }),
            ..Self::new()
        }
    }

    /// Seed an object as if it had been created by someone else
    pub fn insert(&self, mut object: T) {
        let version = self.next_version();
        let meta = object.metadata_mut();
        meta.resource_version = Some(version);
        let key = (meta.namespace.clone(), meta.name.clone());
        self.objects.lock().unwrap().insert(key, object);
    }

    pub fn get_now(&self, namespace: &str, name: &str) -> Option<T> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn conflict(&self, object: &T, message: &str) -> Error {
        self.conflicts.fetch_add(1, Ordering::SeqCst);
        Error::conflict(T::KIND, object.metadata().key(), message)
    }
}

#[async_trait]
impl<T> ObjectStore<T> for MemoryStore<T>
where
    T: ManagedObject + Clone + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<T>, Error> {
        let found = self.get_now(namespace, name);
        if let Some(gate) = &self.gate {
            if gate.reads.fetch_add(1, Ordering::SeqCst) < gate.parties {
                gate.barrier.wait().await;
            }
        }
        Ok(found)
    }

    async fn create(&self, object: &T) -> Result<T, Error> {
        let mut objects = self.objects.lock().unwrap();
        let meta = object.metadata();
        let key = (meta.namespace.clone(), meta.name.clone());
        if objects.contains_key(&key) {
            drop(objects);
            return Err(self.conflict(object, "already exists"));
        }

        let mut created = object.clone();
        created.metadata_mut().resource_version = Some(self.next_version());
        objects.insert(key, created.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn update(&self, object: &T) -> Result<T, Error> {
        let mut objects = self.objects.lock().unwrap();
        let meta = object.metadata();
        let key = (meta.namespace.clone(), meta.name.clone());
        let current = match objects.get(&key) {
            Some(current) => current.metadata().resource_version.clone(),
            None => {
                return Err(Error::internal_with_context(
                    "memory store",
                    format!("{} {} not found", T::KIND, meta.key()),
                ))
            }
        };
        if current != meta.resource_version {
            drop(objects);
            return Err(self.conflict(object, "resourceVersion is stale"));
        }

        let mut updated = object.clone();
        updated.metadata_mut().resource_version = Some(self.next_version());
        objects.insert(key, updated.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

/// Event publisher that remembers every reason it was given
#[derive(Default)]
pub struct RecordingEvents {
    reasons: Mutex<Vec<String>>,
}

impl RecordingEvents {
    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEvents {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
        self.reasons.lock().unwrap().push(reason.to_string());
    }
}

/// A controller context wired to in-memory collaborators
pub struct Harness {
    pub hpas: Arc<MemoryStore<HorizontalPodAutoscaler>>,
    pub adapter_config: Arc<MemoryStore<ConfigMap>>,
    pub events: Arc<RecordingEvents>,
    pub ctx: Arc<Context>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_adapter_store(MemoryStore::new())
    }

    pub fn with_adapter_store(adapter_config: MemoryStore<ConfigMap>) -> Self {
        let hpas = Arc::new(MemoryStore::new());
        let adapter_config = Arc::new(adapter_config);
        let events = Arc::new(RecordingEvents::default());
        let ctx = Arc::new(Context::from_parts(
            hpas.clone(),
            adapter_config.clone(),
            events.clone(),
            ControllerConfig::default(),
        ));
        Self {
            hpas,
            adapter_config,
            events,
            ctx,
        }
    }

    pub fn hpa(&self, namespace: &str, name: &str) -> Option<HorizontalPodAutoscaler> {
        self.hpas.get_now(namespace, name)
    }

    pub fn adapter_document(&self) -> Option<String> {
        let config = &self.ctx.config;
        self.adapter_config
            .get_now(&config.adapter_namespace, &config.adapter_config_name)
            .and_then(|cm| cm.data.get(&config.adapter_config_key).cloned())
    }
}

pub fn component(name: &str, version: &str, metric: &str, threshold: i32) -> Component {
    Component {
        name: name.to_string(),
        version: version.to_string(),
        opt_traits: ComponentTraits {
            autoscaling: AutoscalingSpec {
                metric: metric.to_string(),
                threshold,
                min_replicas: 1,
                max_replicas: 10,
            },
        },
    }
}

pub fn application(name: &str, namespace: &str, components: Vec<Component>) -> Application {
    let mut app = Application::new(name, ApplicationSpec { components });
    app.metadata.namespace = Some(namespace.to_string());
    app.metadata.uid = Some(format!("{name}-uid"));
    app
}
