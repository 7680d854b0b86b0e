//! Discovery rule synthesis
//!
//! A rule is scoped to exactly one workload through its series query, so the
//! series query doubles as the rule's identity in the shared rule set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::expression::{MetricDescriptor, Scope};

/// Series label carrying the pod's namespace
pub const NAMESPACE_LABEL: &str = "kubernetes_namespace";

/// Series label carrying the pod's name
pub const POD_LABEL: &str = "kubernetes_pod_name";

/// One metrics-adapter discovery rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRule {
    /// Label selector identifying the raw series
    pub series_query: String,
    /// Additional regex filters on series names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series_filters: Vec<RegexFilter>,
    /// How series labels map back to Kubernetes resources
    #[serde(default)]
    pub resources: ResourceMapping,
    /// Rewrite of the raw series name into the exposed metric name
    #[serde(default)]
    pub name: NameMapping,
    /// Query template the adapter evaluates for each request
    #[serde(default)]
    pub metrics_query: String,
    /// Fields this controller does not manage, kept as found
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Regex filter on series names
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegexFilter {
    /// Keep series matching this regex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is: Option<String>,
    /// Drop series matching this regex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_not: Option<String>,
    /// Fields this controller does not manage, kept as found
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Label to resource mapping
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceMapping {
    /// Template-based mapping (`kube_<<.Resource>>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Explicit label name to resource overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, GroupResource>,
    /// Fields this controller does not manage, kept as found
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A Kubernetes group/resource pair
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupResource {
    /// API group (empty for core)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Resource name
    pub resource: String,
    /// Fields this controller does not manage, kept as found
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl GroupResource {
    /// Core-group resource
    pub fn core(resource: impl Into<String>) -> Self {
        Self {
            group: None,
            resource: resource.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// Name rewrite from raw series name to exposed metric name
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NameMapping {
    /// Regex applied to the series name
    #[serde(default)]
    pub matches: String,
    /// Replacement, may reference capture groups
    #[serde(default, rename = "as", skip_serializing_if = "String::is_empty")]
    pub as_: String,
    /// Fields this controller does not manage, kept as found
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Series selector for `metric` scoped to one workload's pods
pub fn series_query(metric: &str, namespace: &str, pod_prefix: &str) -> String {
    format!(
        r#"{metric}{{{NAMESPACE_LABEL}="{namespace}",{POD_LABEL}=~"{pod_prefix}.*"}}"#
    )
}

/// Metrics query template for a descriptor.
///
/// `All` aggregates over the window with no grouping, `Per` adds the adapter's
/// group-by placeholder. Any other scope yields an empty query.
pub fn metrics_query(descriptor: &MetricDescriptor) -> String {
    let f = &descriptor.function;
    let window = &descriptor.window;
    let aggregate =
        format!("{f}({f}_over_time(<<.Series>>{{<<.LabelMatchers>>}}[{window}]))");
    match descriptor.scope {
        Scope::All => aggregate,
        Scope::Per => format!("{aggregate} by (<<.GroupBy>>)"),
        Scope::Unrecognized(_) => String::new(),
    }
}

/// Build the discovery rule for one workload's custom metric
pub fn synthesize_rule(
    descriptor: &MetricDescriptor,
    namespace: &str,
    pod_prefix: &str,
) -> DiscoveryRule {
    let overrides = BTreeMap::from([
        (NAMESPACE_LABEL.to_string(), GroupResource::core("namespace")),
        (POD_LABEL.to_string(), GroupResource::core("pod")),
    ]);

    DiscoveryRule {
        series_query: series_query(&descriptor.metric, namespace, pod_prefix),
        series_filters: Vec::new(),
        resources: ResourceMapping {
            template: None,
            overrides,
            extra: BTreeMap::new(),
        },
        name: NameMapping {
            matches: format!("^({})$", descriptor.metric),
            as_: format!("${{1}}_{}_{}", descriptor.function, descriptor.scope),
            extra: BTreeMap::new(),
        },
        metrics_query: metrics_query(descriptor),
        extra: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(expr: &str) -> MetricDescriptor {
        MetricDescriptor::parse(expr).expect("valid expression")
    }

    #[test]
    fn series_query_scopes_to_namespace_and_pod_prefix() {
        let rule = synthesize_rule(
            &descriptor("avg---http_requests---all---5m"),
            "ns1",
            "app1-web-workload-v1",
        );
        assert_eq!(
            rule.series_query,
            r#"http_requests{kubernetes_namespace="ns1",kubernetes_pod_name=~"app1-web-workload-v1.*"}"#
        );
    }

    #[test]
    fn same_workload_yields_same_identity() {
        let a = synthesize_rule(&descriptor("avg---http_requests---all---5m"), "ns1", "app1-web");
        let b = synthesize_rule(&descriptor("max---http_requests---per---1m"), "ns1", "app1-web");
        let c = synthesize_rule(&descriptor("avg---http_requests---all---5m"), "ns1", "app1-api");
        assert_eq!(a.series_query, b.series_query);
        assert_ne!(a.series_query, c.series_query);
    }

    #[test]
    fn resource_overrides_are_fixed() {
        let rule = synthesize_rule(&descriptor("avg---m---all---5m"), "ns", "p");
        assert_eq!(rule.resources.overrides.len(), 2);
        assert_eq!(
            rule.resources.overrides[NAMESPACE_LABEL],
            GroupResource::core("namespace")
        );
        assert_eq!(rule.resources.overrides[POD_LABEL], GroupResource::core("pod"));
    }

    #[test]
    fn name_template_rewrites_to_exposed_name() {
        let d = descriptor("avg---http_requests---all---5m");
        let rule = synthesize_rule(&d, "ns", "p");
        assert_eq!(rule.name.matches, "^(http_requests)$");
        assert_eq!(rule.name.as_, "${1}_avg_all");
        assert_eq!(
            rule.name.as_.replace("${1}", &d.metric),
            d.exposed_name()
        );
    }

    #[test]
    fn all_scope_has_no_grouping() {
        let q = metrics_query(&descriptor("avg---http_requests---all---5m"));
        assert_eq!(
            q,
            "avg(avg_over_time(<<.Series>>{<<.LabelMatchers>>}[5m]))"
        );
    }

    #[test]
    fn per_scope_only_adds_group_by() {
        let all = metrics_query(&descriptor("sum---jobs---all---2m"));
        let per = metrics_query(&descriptor("sum---jobs---per---2m"));
        assert_eq!(per, format!("{all} by (<<.GroupBy>>)"));
    }

    #[test]
    fn unrecognized_scope_yields_empty_query() {
        let rule = synthesize_rule(&descriptor("sum---jobs---every---2m"), "ns", "p");
        assert!(rule.metrics_query.is_empty());
        assert_eq!(rule.name.as_, "${1}_sum_every");
    }

    #[test]
    fn serializes_in_adapter_format() {
        let rule = synthesize_rule(&descriptor("avg---http_requests---all---5m"), "ns", "p");
        let yaml = serde_yaml::to_string(&rule).expect("serialize");
        assert!(yaml.contains("seriesQuery:"));
        assert!(yaml.contains("metricsQuery:"));
        assert!(yaml.contains("overrides:"));
        assert!(yaml.contains("_avg_all"));
        assert!(!yaml.contains("seriesFilters"));
    }
}
