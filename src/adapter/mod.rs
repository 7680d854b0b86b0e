//! Metrics-adapter discovery rules
//!
//! The metrics adapter reads one cluster-wide configuration document listing
//! discovery rules. Each rule tells it how to expose a raw Prometheus series as
//! a named custom metric that an HPA can reference.
//!
//! - [`rule`] builds the rule for one component's metric
//! - [`rule_set`] loads, merges and stores the shared rule list without
//!   disturbing other tenants' entries

pub mod rule;
pub mod rule_set;

pub use rule::{synthesize_rule, DiscoveryRule, GroupResource, NameMapping, ResourceMapping};
pub use rule_set::{MergeOutcome, RuleSet};
