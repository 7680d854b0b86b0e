//! Metric expression parsing
//!
//! A component's autoscaling trait names its metric with a compact string:
//!
//! - `cpu` / `memory`: built-in resource utilization, handled by the HPA alone
//! - `function---metric---scope---window`: a custom Prometheus metric exposed
//!   through the metrics adapter, e.g. `avg---http_requests---all---5m`
//!
//! Parsing fails closed: anything that is not exactly one of these shapes
//! resolves to `None` and autoscaling is skipped for the component.

use std::fmt;

/// Separator between the four fields of a custom metric expression
pub const FIELD_DELIMITER: &str = "---";

const FIELD_COUNT: usize = 4;

/// Aggregation scope of a custom metric
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// One aggregate across all of the workload's pods
    All,
    /// One value per matched series
    Per,
    /// Any other text, carried verbatim. Produces an empty metrics query.
    Unrecognized(String),
}

impl Scope {
    fn parse(s: &str) -> Self {
        match s {
            "all" => Self::All,
            "per" => Self::Per,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Per => write!(f, "per"),
            Self::Unrecognized(s) => write!(f, "{s}"),
        }
    }
}

/// Structured form of `function---metric---scope---window`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricDescriptor {
    /// PromQL aggregation function (avg, sum, max, ...)
    pub function: String,
    /// Raw Prometheus series name
    pub metric: String,
    /// Aggregation scope
    pub scope: Scope,
    /// Range window (e.g. `5m`), passed through verbatim
    pub window: String,
}

impl MetricDescriptor {
    /// Parse a four-field custom metric expression.
    ///
    /// Returns `None` unless the expression splits into exactly four non-empty
    /// fields. Field contents are not validated further.
    pub fn parse(expr: &str) -> Option<Self> {
        let fields: Vec<&str> = expr.split(FIELD_DELIMITER).collect();
        if fields.len() != FIELD_COUNT || fields.iter().any(|f| f.is_empty()) {
            return None;
        }

        Some(Self {
            function: fields[0].to_string(),
            metric: fields[1].to_string(),
            scope: Scope::parse(fields[2]),
            window: fields[3].to_string(),
        })
    }

    /// Name under which the metrics adapter exposes this metric
    ///
    /// Both the discovery rule's name template and the HPA's pods metric
    /// reference this exact name.
    pub fn exposed_name(&self) -> String {
        format!("{}_{}_{}", self.metric, self.function, self.scope)
    }
}

impl fmt::Display for MetricDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{d}{}{d}{}{d}{}",
            self.function,
            self.metric,
            self.scope,
            self.window,
            d = FIELD_DELIMITER
        )
    }
}

/// Built-in resource metrics understood natively by the HPA
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceMetric {
    /// CPU utilization
    Cpu,
    /// Memory utilization
    Memory,
}

impl ResourceMetric {
    /// Kubernetes resource name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for ResourceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a component scales on. Exactly one kind per component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetricSource {
    /// Custom metric served by the metrics adapter
    Custom(MetricDescriptor),
    /// Built-in resource utilization
    Resource(ResourceMetric),
}

impl MetricSource {
    /// Resolve a raw metric expression.
    ///
    /// `cpu` and `memory` match exactly and bypass the custom-metric parser.
    pub fn resolve(expr: &str) -> Option<Self> {
        match expr {
            "cpu" => Some(Self::Resource(ResourceMetric::Cpu)),
            "memory" => Some(Self::Resource(ResourceMetric::Memory)),
            other => MetricDescriptor::parse(other).map(Self::Custom),
        }
    }

    /// The custom metric descriptor, if this is a custom metric
    pub fn descriptor(&self) -> Option<&MetricDescriptor> {
        match self {
            Self::Custom(d) => Some(d),
            Self::Resource(_) => None,
        }
    }
}
