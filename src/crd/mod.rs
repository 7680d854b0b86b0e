//! Custom Resource Definitions consumed by the autoscaling controller
//!
//! The `Application` resource owns a list of components; each component may
//! carry an autoscaling trait that this controller turns into an HPA and a
//! metrics-adapter discovery rule.

mod application;
mod types;

pub use application::{Application, ApplicationSpec};
pub use types::{AutoscalingSpec, Component, ComponentTraits};
