//! Supporting types for the Application CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::expression::MetricSource;

/// A deployable unit within an Application
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Component name, unique within the Application
    pub name: String,

    /// Component version, part of every derived object name
    #[serde(default)]
    pub version: String,

    /// Optional operational traits
    #[serde(default)]
    pub opt_traits: ComponentTraits,
}

impl Component {
    /// Name of the component's Deployment, also the prefix of its pod names
    pub fn workload_name(&self, app: &str) -> String {
        format!("{}-{}-workload-{}", app, self.name, self.version)
    }

    /// Name of the component's HorizontalPodAutoscaler
    pub fn hpa_name(&self, app: &str) -> String {
        format!("{}-{}-{}-hpa", app, self.name, self.version)
    }
}

/// Operational traits attached to a component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentTraits {
    /// Horizontal autoscaling; the all-zero value means not requested
    #[serde(default)]
    pub autoscaling: AutoscalingSpec,
}

/// Autoscaling trait of a component
///
/// `metric` is either `cpu`, `memory`, or a custom metric expression
/// `function---metric---scope---window` (see [`crate::expression`]).
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingSpec {
    /// Metric expression
    #[serde(default)]
    pub metric: String,

    /// Target value: utilization percentage for cpu/memory, average value for
    /// custom metrics
    #[serde(default)]
    pub threshold: i32,

    /// Lower replica bound
    #[serde(default)]
    pub min_replicas: i32,

    /// Upper replica bound
    #[serde(default)]
    pub max_replicas: i32,
}

impl AutoscalingSpec {
    /// False for the zero value, which means autoscaling was not requested
    pub fn is_requested(&self) -> bool {
        *self != Self::default()
    }

    /// Resolve the metric expression, `None` when it is not applicable
    pub fn metric_source(&self) -> Option<MetricSource> {
        MetricSource::resolve(&self.metric)
    }

    /// Validate replica bounds and threshold before synthesis.
    pub fn validate(&self, component: &str) -> Result<(), crate::Error> {
        if self.min_replicas < 1 {
            return Err(crate::Error::validation_for(
                component,
                format!("minReplicas must be at least 1, got {}", self.min_replicas),
            ));
        }
        if self.max_replicas < self.min_replicas {
            return Err(crate::Error::validation_for(
                component,
                format!(
                    "maxReplicas ({}) must not be less than minReplicas ({})",
                    self.max_replicas, self.min_replicas
                ),
            ));
        }
        if self.threshold <= 0 {
            return Err(crate::Error::validation_for(
                component,
                format!(
                    "autoscaling metric '{}' threshold must be greater than 0",
                    self.metric
                ),
            ));
        }
        if (self.metric == "cpu" || self.metric == "memory") && self.threshold > 100 {
            return Err(crate::Error::validation_for(
                component,
                format!(
                    "autoscaling metric '{}' threshold cannot exceed 100%",
                    self.metric
                ),
            ));
        }
        Ok(())
    }
}
