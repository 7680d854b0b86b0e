//! Application controller implementation
//!
//! For every component of an Application that requests autoscaling, the
//! controller keeps two derived objects in line with the Application:
//!
//! 1. The component's discovery rule in the shared metrics-adapter ConfigMap
//!    (custom metrics only). The ConfigMap is written by every component in
//!    the cluster, so writes use optimistic concurrency and a
//!    re-read/re-merge/re-write loop on conflict.
//! 2. The component's HorizontalPodAutoscaler, converged by snapshot
//!    comparison so an unchanged component issues no writes.
//!
//! A failure part-way through leaves the earlier step applied. The next pass
//! is idempotent and completes the rest.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::adapter::{synthesize_rule, DiscoveryRule, RuleSet};
use crate::apply::{converge, ApplyAction, ObjectStore};
use crate::crd::{Application, Component};
use crate::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use crate::retry::{retry_with_backoff_when, RetryConfig};
use crate::store::{ConfigMapStore, HpaStore};
use crate::workload::{compile_hpa, ConfigMap, HorizontalPodAutoscaler, ObjectMeta, ScaleTargetRef};
use crate::Error;

/// Requeue delay after a retryable reconcile failure
const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Runtime settings of the controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace of the metrics-adapter ConfigMap
    pub adapter_namespace: String,
    /// Name of the metrics-adapter ConfigMap
    pub adapter_config_name: String,
    /// Data key holding the rule set document
    pub adapter_config_key: String,
    /// apiVersion used in each HPA's scale target reference
    pub workload_api_version: String,
    /// Attempts at writing the shared rule set before a conflict is surfaced
    pub conflict_retries: u32,
    /// Delay before a successfully reconciled Application is checked again
    pub requeue_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            adapter_namespace: crate::ADAPTER_CONFIG_NAMESPACE.to_string(),
            adapter_config_name: crate::ADAPTER_CONFIG_NAME.to_string(),
            adapter_config_key: crate::ADAPTER_CONFIG_KEY.to_string(),
            workload_api_version: crate::DEFAULT_WORKLOAD_API_VERSION.to_string(),
            conflict_retries: crate::DEFAULT_CONFLICT_RETRIES,
            requeue_interval: crate::DEFAULT_REQUEUE_INTERVAL,
        }
    }
}

/// Controller context shared by every reconcile
pub struct Context {
    /// HorizontalPodAutoscaler access
    pub hpas: Arc<dyn ObjectStore<HorizontalPodAutoscaler>>,
    /// Metrics-adapter ConfigMap access
    pub adapter_config: Arc<dyn ObjectStore<ConfigMap>>,
    /// Event sink for the Application
    pub events: Arc<dyn EventPublisher>,
    /// Runtime settings
    pub config: ControllerConfig,
}

impl Context {
    /// Create a context backed by the API server
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self {
            hpas: Arc::new(HpaStore::new(client.clone())),
            adapter_config: Arc::new(ConfigMapStore::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, crate::FIELD_MANAGER)),
            config,
        }
    }

    /// Create a context from explicit collaborators (fakes, mocks)
    pub fn from_parts(
        hpas: Arc<dyn ObjectStore<HorizontalPodAutoscaler>>,
        adapter_config: Arc<dyn ObjectStore<ConfigMap>>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            hpas,
            adapter_config,
            events,
            config,
        }
    }
}

/// What a rule set write did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleSetOutcome {
    /// The ConfigMap did not exist and was created holding the rule
    Created,
    /// The rule was appended or replaced and the ConfigMap rewritten
    Updated,
    /// The rule was already present unchanged
    Unchanged,
}

/// What reconciling one component did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentOutcome {
    /// The component has no autoscaling trait
    NotRequested,
    /// The metric expression did not resolve; nothing was written
    Skipped,
    /// Derived objects were converged
    Applied {
        /// Rule set write, `None` for built-in resource metrics
        rule_set: Option<RuleSetOutcome>,
        /// HPA convergence
        hpa: ApplyAction,
    },
}

/// Reconcile an Application
///
/// Every autoscaled component is reconciled even if an earlier one fails.
/// The returned error prefers a retryable failure so the Application is
/// requeued while any component can still make progress.
#[instrument(
    skip(app, ctx),
    fields(app = %app.name_any(), namespace = ?app.namespace())
)]
pub async fn reconcile(app: Arc<Application>, ctx: Arc<Context>) -> Result<Action, Error> {
    debug!(components = app.spec.components.len(), "reconciling application");

    let mut failures = Vec::new();
    for component in app.autoscaled_components() {
        match reconcile_component(&app, component, &ctx).await {
            Ok(outcome) => debug!(component = %component.name, ?outcome, "component reconciled"),
            Err(e) => {
                warn!(component = %component.name, error = %e, "component reconcile failed");
                failures.push(e);
            }
        }
    }

    match failures.iter().position(Error::is_retryable) {
        Some(i) => Err(failures.swap_remove(i)),
        None => match failures.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(Action::requeue(ctx.config.requeue_interval)),
        },
    }
}

/// Reconcile one component: merge its discovery rule, then converge its HPA
#[instrument(skip(app, component, ctx), fields(component = %component.name))]
pub async fn reconcile_component(
    app: &Application,
    component: &Component,
    ctx: &Context,
) -> Result<ComponentOutcome, Error> {
    let autoscaling = &component.opt_traits.autoscaling;
    if !autoscaling.is_requested() {
        return Ok(ComponentOutcome::NotRequested);
    }

    let app_name = app.name_any();
    let namespace = app.namespace().ok_or_else(|| {
        Error::validation_for(&component.name, format!("application {app_name} has no namespace"))
    })?;

    let Some(source) = autoscaling.metric_source() else {
        info!(metric = %autoscaling.metric, "metric expression not applicable, skipping");
        return Ok(ComponentOutcome::Skipped);
    };

    if let Err(e) = autoscaling.validate(&component.name) {
        publish(
            ctx,
            app,
            EventType::Warning,
            reasons::VALIDATION_FAILED,
            actions::RECONCILE,
            e.to_string(),
        )
        .await;
        return Err(e);
    }

    let workload = component.workload_name(&app_name);

    let rule_set = match source.descriptor() {
        Some(descriptor) => {
            let rule = synthesize_rule(descriptor, &namespace, &workload);
            let outcome =
                sync_rule_set(ctx.adapter_config.as_ref(), &ctx.config, &rule).await?;
            let reason = match outcome {
                RuleSetOutcome::Created => Some(reasons::RULE_SET_CREATED),
                RuleSetOutcome::Updated => Some(reasons::RULE_SET_UPDATED),
                RuleSetOutcome::Unchanged => None,
            };
            if let Some(reason) = reason {
                publish(
                    ctx,
                    app,
                    EventType::Normal,
                    reason,
                    actions::MERGE_RULE,
                    format!("discovery rule for {} ({})", descriptor.exposed_name(), component.name),
                )
                .await;
            }
            Some(outcome)
        }
        None => None,
    };

    let metadata = ObjectMeta::new(component.hpa_name(&app_name), &namespace)
        .with_owner(app.owner_reference()?.into());
    let hpa = compile_hpa(
        metadata,
        &source,
        autoscaling,
        ScaleTargetRef::deployment(&ctx.config.workload_api_version, &workload),
    );
    let hpa_name = hpa.metadata.name.clone();
    let action = converge(ctx.hpas.as_ref(), hpa).await?;

    let reason = match action {
        ApplyAction::Create => Some(reasons::HPA_CREATED),
        ApplyAction::Update => Some(reasons::HPA_UPDATED),
        ApplyAction::NoOp => None,
    };
    if let Some(reason) = reason {
        publish(ctx, app, EventType::Normal, reason, actions::APPLY_HPA, hpa_name).await;
    }

    Ok(ComponentOutcome::Applied {
        rule_set,
        hpa: action,
    })
}

/// Merge `rule` into the shared rule set, retrying on write conflicts.
///
/// Every attempt re-reads the ConfigMap so the merge always applies to the
/// latest version. Only conflicts are retried; any other error is returned
/// from the attempt that hit it.
pub async fn sync_rule_set(
    store: &dyn ObjectStore<ConfigMap>,
    config: &ControllerConfig,
    rule: &DiscoveryRule,
) -> Result<RuleSetOutcome, Error> {
    let retry = RetryConfig::for_conflicts(config.conflict_retries);
    let outcome = retry_with_backoff_when(&retry, "merge discovery rule", Error::is_conflict, || {
        merge_rule_once(store, config, rule)
    })
    .await?;

    info!(rule = %rule.series_query, ?outcome, "discovery rule synced");
    Ok(outcome)
}

/// One read-merge-write cycle against the shared ConfigMap
async fn merge_rule_once(
    store: &dyn ObjectStore<ConfigMap>,
    config: &ControllerConfig,
    rule: &DiscoveryRule,
) -> Result<RuleSetOutcome, Error> {
    let key = &config.adapter_config_key;

    let Some(mut config_map) = store
        .get(&config.adapter_namespace, &config.adapter_config_name)
        .await?
    else {
        let mut rules = RuleSet::default();
        rules.merge(rule.clone());
        let config_map = ConfigMap::new(
            ObjectMeta::new(&config.adapter_config_name, &config.adapter_namespace),
            BTreeMap::from([(key.clone(), rules.to_yaml()?)]),
        );
        store.create(&config_map).await?;
        return Ok(RuleSetOutcome::Created);
    };

    let current = config_map.data.get(key).map(String::as_str).unwrap_or_default();
    let mut rules = RuleSet::from_yaml(current)?;
    if !rules.merge(rule.clone()).changed() {
        return Ok(RuleSetOutcome::Unchanged);
    }

    debug!(
        resource_version = ?config_map.metadata.resource_version,
        rules = rules.rules.len(),
        "writing rule set"
    );
    config_map.data.insert(key.clone(), rules.to_yaml()?);
    store.update(&config_map).await?;
    Ok(RuleSetOutcome::Updated)
}

async fn publish(
    ctx: &Context,
    app: &Application,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(&app.object_ref(&()), type_, reason, action, Some(note))
        .await;
}

/// Error policy for the controller
///
/// Transient failures are retried after a short delay. Permanent ones
/// (invalid spec, unparseable rule set) wait for the Application to change.
pub fn error_policy(app: Arc<Application>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_retryable() {
        warn!(
            error = %error,
            app = %app.name_any(),
            "reconciliation failed, requeueing"
        );
        Action::requeue(ERROR_REQUEUE)
    } else {
        error!(
            error = %error,
            app = %app.name_any(),
            "reconciliation failed permanently, waiting for spec change"
        );
        Action::await_change()
    }
}
