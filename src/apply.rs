//! Snapshot-based convergence of derived objects
//!
//! Every write stamps the object with a canonical snapshot of the desired state
//! it was built from ([`crate::LAST_APPLIED_ANNOTATION`]). The next pass
//! recomputes that snapshot and only writes when it differs, so an unchanged
//! component never produces API traffic.
//!
//! The snapshot is the `serde_json` serialization of the desired object taken
//! before the annotation and version token are attached. `serde_json::Value`
//! keeps object keys sorted, so the snapshot does not depend on the order in
//! which maps or fields were populated.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::workload::ManagedObject;
use crate::{Error, LAST_APPLIED_ANNOTATION};

/// What [`converge`] did to the live object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyAction {
    /// The object did not exist and was created
    Create,
    /// The object existed with a different snapshot and was replaced
    Update,
    /// The object already reflects the desired state
    NoOp,
}

impl std::fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::NoOp => write!(f, "noop"),
        }
    }
}

/// Typed access to one kind of namespaced object.
///
/// `update` must fail with a conflict (HTTP 409) when the object's
/// `resourceVersion` is stale, and `create` must fail with a conflict when the
/// object already exists.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore<T: Send + Sync + 'static>: Send + Sync {
    /// Fetch an object, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<T>, Error>;

    /// Create an object
    async fn create(&self, object: &T) -> Result<T, Error>;

    /// Replace an object, guarded by its `resourceVersion`
    async fn update(&self, object: &T) -> Result<T, Error>;
}

/// Canonical snapshot of an object's desired state
pub fn snapshot<T: Serialize>(object: &T) -> Result<String, Error> {
    let value = serde_json::to_value(object)
        .map_err(|e| Error::serialization(format!("snapshot: {e}")))?;
    serde_json::to_string(&value).map_err(|e| Error::serialization(format!("snapshot: {e}")))
}

/// The snapshot recorded on a live object, if any
pub fn recorded_snapshot<T: ManagedObject>(object: &T) -> Option<&str> {
    object
        .metadata()
        .annotations
        .get(LAST_APPLIED_ANNOTATION)
        .map(String::as_str)
}

/// Decide what to do with `desired` given the live object.
///
/// Attaches the snapshot annotation to `desired` and, on update, the live
/// object's `resourceVersion`.
pub fn plan<T: ManagedObject + Serialize>(
    desired: &mut T,
    existing: Option<&T>,
) -> Result<ApplyAction, Error> {
    let desired_snapshot = snapshot(desired)?;

    let action = match existing {
        None => ApplyAction::Create,
        Some(live) if recorded_snapshot(live) == Some(desired_snapshot.as_str()) => {
            ApplyAction::NoOp
        }
        Some(live) => {
            desired.metadata_mut().resource_version = live.metadata().resource_version.clone();
            ApplyAction::Update
        }
    };

    desired
        .metadata_mut()
        .annotations
        .insert(LAST_APPLIED_ANNOTATION.to_string(), desired_snapshot);
    Ok(action)
}

/// Converge the live object towards `desired`: create, update or leave it.
pub async fn converge<T>(store: &dyn ObjectStore<T>, mut desired: T) -> Result<ApplyAction, Error>
where
    T: ManagedObject + Serialize + Send + Sync + 'static,
{
    let (namespace, name) = {
        let meta = desired.metadata();
        (meta.namespace.clone(), meta.name.clone())
    };

    let existing = store.get(&namespace, &name).await?;
    let action = plan(&mut desired, existing.as_ref())?;

    match action {
        ApplyAction::Create => {
            store.create(&desired).await?;
            info!(kind = T::KIND, namespace = %namespace, name = %name, "created");
        }
        ApplyAction::Update => {
            store.update(&desired).await?;
            info!(kind = T::KIND, namespace = %namespace, name = %name, "updated");
        }
        ApplyAction::NoOp => {
            debug!(kind = T::KIND, namespace = %namespace, name = %name, "already up to date");
        }
    }
    Ok(action)
}
