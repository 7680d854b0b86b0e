//! Controller for Application resources
//!
//! Watches Applications and converges each autoscaled component's discovery
//! rule and HorizontalPodAutoscaler.

mod application;

pub use application::{
    error_policy, reconcile, reconcile_component, sync_rule_set, ComponentOutcome, Context,
    ControllerConfig, RuleSetOutcome,
};
