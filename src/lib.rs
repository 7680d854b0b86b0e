//! app-autoscaler - HPA and custom-metric discovery for Application components
//!
//! Components of an `Application` custom resource declare an autoscaling trait
//! naming either a built-in resource metric (`cpu`, `memory`) or a custom
//! metric expression `function---metric---scope---window`. The controller
//! derives two objects from each such trait and keeps them convergent:
//!
//! - a discovery rule in the metrics adapter's shared ConfigMap, which exposes
//!   the workload's raw series as a named custom metric
//! - a HorizontalPodAutoscaler scaling the component's Deployment on that
//!   metric
//!
//! # Modules
//!
//! - [`crd`] - The Application custom resource and its component traits
//! - [`expression`] - Metric expression parsing
//! - [`adapter`] - Discovery rule synthesis and the shared rule set merge
//! - [`workload`] - Derived Kubernetes resource types and the HPA compiler
//! - [`apply`] - Snapshot-based convergence over an object store
//! - [`store`] - API server backed object stores
//! - [`controller`] - Application reconciliation
//! - [`events`] - Kubernetes Event publishing
//! - [`retry`] - Backoff for conflicting writes
//! - [`telemetry`] - Logging and trace export setup
//! - [`error`] - Error types for the controller

#![deny(missing_docs)]

pub mod adapter;
pub mod apply;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod expression;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod workload;

use std::time::Duration;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Field manager and controller name reported on every write and Event
pub const FIELD_MANAGER: &str = "app-autoscaler";

/// Default namespace of the metrics-adapter ConfigMap
pub const ADAPTER_CONFIG_NAMESPACE: &str = "monitoring";

/// Default name of the metrics-adapter ConfigMap
pub const ADAPTER_CONFIG_NAME: &str = "adapter-config";

/// Default ConfigMap key holding the rule set document
pub const ADAPTER_CONFIG_KEY: &str = "config.yaml";

/// Annotation recording the snapshot a derived object was last written from
pub const LAST_APPLIED_ANNOTATION: &str = "project.cattle.io/last-applied-configuration";

/// Default attempts at writing the shared rule set
pub const DEFAULT_CONFLICT_RETRIES: u32 = 5;

/// Default apiVersion of the scaled Deployments
pub const DEFAULT_WORKLOAD_API_VERSION: &str = "apps/v1";

/// Default delay between periodic reconciles of an Application
pub const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(300);
