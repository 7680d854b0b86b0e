//! Kubernetes Event recording for the Application controller.
//!
//! Provides a trait-based abstraction over `kube::runtime::events::Recorder`
//! so that writes made on behalf of an Application show up in
//! `kubectl describe application`.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

/// Trait for publishing Kubernetes Events.
///
/// Implementations are expected to be fire-and-forget: `publish()` logs a
/// warning on failure but never returns an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "HpaCreated")
    /// * `action` - What action was taken (e.g. "Reconcile")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher reporting as `controller_name`.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Publisher that drops every event, for tests and dry runs.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown under REASON in `kubectl get events`.
pub mod reasons {
    /// A discovery rule was added to the shared rule set
    pub const RULE_SET_CREATED: &str = "RuleSetCreated";
    /// The shared rule set was rewritten with this component's rule
    pub const RULE_SET_UPDATED: &str = "RuleSetUpdated";
    /// HorizontalPodAutoscaler created
    pub const HPA_CREATED: &str = "HpaCreated";
    /// HorizontalPodAutoscaler brought back in line with the Application
    pub const HPA_UPDATED: &str = "HpaUpdated";
    /// Autoscaling trait failed validation
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
}

/// Event actions, shown under ACTION in `kubectl get events`.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Merging a discovery rule into the shared rule set
    pub const MERGE_RULE: &str = "MergeRule";
    /// Converging a HorizontalPodAutoscaler
    pub const APPLY_HPA: &str = "ApplyHpa";
}
