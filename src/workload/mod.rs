//! Kubernetes resource types derived from an Application
//!
//! This module defines the resources the controller writes:
//! - HorizontalPodAutoscaler: one per autoscaled component
//! - ConfigMap: the shared metrics-adapter configuration
//!
//! They are plain serde types rather than k8s-openapi structs so that the
//! desired state serializes to a stable snapshot. [`crate::store`] converts
//! them to and from the API server's types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crd::AutoscalingSpec;
use crate::expression::MetricSource;

/// Label recording the resource's name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Label recording which controller manages the resource
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

// =============================================================================
// Object metadata
// =============================================================================

/// Kubernetes ObjectMeta
///
/// Fields the controller does not model (uid, finalizers, managedFields, ...)
/// are kept in `extra` so a read-modify-write never drops them.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    #[serde(default)]
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Owner references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Optimistic-concurrency version token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    /// Unmodelled metadata fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ObjectMeta {
    /// Create new metadata with the standard management labels
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_NAME.to_string(), name.clone());
        labels.insert(
            LABEL_MANAGED_BY.to_string(),
            crate::FIELD_MANAGER.to_string(),
        );
        Self {
            name,
            namespace: namespace.into(),
            labels,
            ..Default::default()
        }
    }

    /// Add an owner reference
    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner_references.push(owner);
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// `namespace/name`, for logs and errors
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Owner reference (back-reference to the owning Application)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// Owner API version
    pub api_version: String,
    /// Owner kind
    pub kind: String,
    /// Owner name
    pub name: String,
    /// Owner uid
    pub uid: String,
    /// Whether the owner is the managing controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    /// Whether deletion of the owner waits for this object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

impl From<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference> for OwnerReference {
    fn from(r: k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference) -> Self {
        Self {
            api_version: r.api_version,
            kind: r.kind,
            name: r.name,
            uid: r.uid,
            controller: r.controller,
            block_owner_deletion: r.block_owner_deletion,
        }
    }
}

/// A namespaced Kubernetes object with typed metadata
pub trait ManagedObject {
    /// Full API version (e.g., "autoscaling/v2", "v1")
    const API_VERSION: &'static str;
    /// Resource kind
    const KIND: &'static str;

    /// Object metadata
    fn metadata(&self) -> &ObjectMeta;

    /// Mutable object metadata
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
}

// =============================================================================
// HorizontalPodAutoscaler
// =============================================================================

/// Kubernetes HorizontalPodAutoscaler (v2)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscaler {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: HpaSpec,
}

impl ManagedObject for HorizontalPodAutoscaler {
    const API_VERSION: &'static str = "autoscaling/v2";
    const KIND: &'static str = "HorizontalPodAutoscaler";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// HPA spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HpaSpec {
    /// Scale target ref
    pub scale_target_ref: ScaleTargetRef,
    /// Min replicas
    #[serde(default)]
    pub min_replicas: i32,
    /// Max replicas
    pub max_replicas: i32,
    /// Metrics
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricSpec>,
}

/// Scale target reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTargetRef {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Name
    pub name: String,
}

impl ScaleTargetRef {
    /// Reference to a Deployment
    pub fn deployment(api_version: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: "Deployment".to_string(),
            name: name.into(),
        }
    }
}

/// Metric specification
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    /// Metric type ("Pods" or "Resource")
    #[serde(rename = "type")]
    pub type_: String,
    /// Pods metric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<PodsMetricSource>,
    /// Resource metric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceMetricSource>,
}

impl MetricSpec {
    /// Custom per-pod metric with an average-value target
    pub fn pods(metric_name: impl Into<String>, average_value: impl Into<String>) -> Self {
        Self {
            type_: "Pods".to_string(),
            pods: Some(PodsMetricSource {
                metric: MetricIdentifier {
                    name: metric_name.into(),
                },
                target: MetricTarget {
                    type_: "AverageValue".to_string(),
                    average_value: Some(average_value.into()),
                    average_utilization: None,
                },
            }),
            resource: None,
        }
    }

    /// Built-in resource metric with an average-utilization target
    pub fn resource(resource: impl Into<String>, average_utilization: i32) -> Self {
        Self {
            type_: "Resource".to_string(),
            pods: None,
            resource: Some(ResourceMetricSource {
                name: resource.into(),
                target: MetricTarget {
                    type_: "Utilization".to_string(),
                    average_value: None,
                    average_utilization: Some(average_utilization),
                },
            }),
        }
    }
}

/// Pods metric source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodsMetricSource {
    /// Metric identifier
    pub metric: MetricIdentifier,
    /// Target
    pub target: MetricTarget,
}

/// Metric identifier
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricIdentifier {
    /// Metric name as exposed by the metrics adapter
    pub name: String,
}

/// Resource metric source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetricSource {
    /// Resource name (cpu, memory)
    pub name: String,
    /// Target
    pub target: MetricTarget,
}

/// Metric target
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricTarget {
    /// Target type
    #[serde(rename = "type")]
    pub type_: String,
    /// Average value as a Kubernetes quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_value: Option<String>,
    /// Average utilization percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_utilization: Option<i32>,
}

// =============================================================================
// ConfigMap
// =============================================================================

/// Kubernetes ConfigMap
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// String data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    /// Unmodelled top-level fields (binaryData, immutable)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ConfigMap {
    /// Create a ConfigMap with the given data
    pub fn new(metadata: ObjectMeta, data: BTreeMap<String, String>) -> Self {
        Self {
            api_version: Self::API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            metadata,
            data,
            extra: BTreeMap::new(),
        }
    }
}

impl ManagedObject for ConfigMap {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "ConfigMap";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// =============================================================================
// HPA compiler
// =============================================================================

/// Compile the HorizontalPodAutoscaler for one component.
///
/// A custom metric yields one Pods metric named after the adapter's exposed
/// name with an average-value target of `threshold`. A built-in metric yields
/// one Resource metric at `threshold` percent utilization. Replica bounds pass
/// through unchecked; callers validate them first.
pub fn compile_hpa(
    metadata: ObjectMeta,
    source: &MetricSource,
    spec: &AutoscalingSpec,
    scale_target_ref: ScaleTargetRef,
) -> HorizontalPodAutoscaler {
    let metric = match source {
        MetricSource::Custom(descriptor) => {
            MetricSpec::pods(descriptor.exposed_name(), spec.threshold.to_string())
        }
        MetricSource::Resource(resource) => MetricSpec::resource(resource.as_str(), spec.threshold),
    };

    HorizontalPodAutoscaler {
        api_version: HorizontalPodAutoscaler::API_VERSION.to_string(),
        kind: HorizontalPodAutoscaler::KIND.to_string(),
        metadata,
        spec: HpaSpec {
            scale_target_ref,
            min_replicas: spec.min_replicas,
            max_replicas: spec.max_replicas,
            metrics: vec![metric],
        },
    }
}
