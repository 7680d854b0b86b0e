//! app-autoscaler - converges HPAs and metrics-adapter rules for Applications

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};

use app_autoscaler::controller::{error_policy, reconcile, Context, ControllerConfig};
use app_autoscaler::crd::Application;
use app_autoscaler::telemetry::{init_telemetry, LogFormat, TelemetryConfig};

/// Kubernetes controller deriving HPAs and custom-metric discovery rules from
/// Application autoscaling traits
#[derive(Parser, Debug)]
#[command(name = "app-autoscaler", version, about, long_about = None)]
struct Cli {
    /// Print the Application CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    options: ControllerArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller (default mode)
    Controller,
}

/// Controller settings
#[derive(Parser, Debug)]
struct ControllerArgs {
    /// Namespace of the metrics-adapter ConfigMap
    #[arg(
        long,
        env = "ADAPTER_CONFIG_NAMESPACE",
        default_value = app_autoscaler::ADAPTER_CONFIG_NAMESPACE,
        global = true
    )]
    adapter_namespace: String,

    /// Name of the metrics-adapter ConfigMap
    #[arg(
        long,
        env = "ADAPTER_CONFIG_NAME",
        default_value = app_autoscaler::ADAPTER_CONFIG_NAME,
        global = true
    )]
    adapter_config_name: String,

    /// ConfigMap key holding the discovery rules
    #[arg(
        long,
        env = "ADAPTER_CONFIG_KEY",
        default_value = app_autoscaler::ADAPTER_CONFIG_KEY,
        global = true
    )]
    adapter_config_key: String,

    /// apiVersion of the Deployments targeted by generated HPAs
    #[arg(long, default_value = app_autoscaler::DEFAULT_WORKLOAD_API_VERSION, global = true)]
    workload_api_version: String,

    /// Attempts at writing the shared rule set before giving up on a conflict
    #[arg(long, default_value_t = app_autoscaler::DEFAULT_CONFLICT_RETRIES, global = true)]
    conflict_retries: u32,

    /// Seconds between periodic reconciles of each Application
    #[arg(long, default_value_t = app_autoscaler::DEFAULT_REQUEUE_INTERVAL.as_secs(), global = true)]
    requeue_secs: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    /// Path to a kubeconfig; in-cluster or default discovery when unset
    #[arg(long, env = "KUBECONFIG", global = true)]
    kubeconfig: Option<PathBuf>,
}

impl ControllerArgs {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            adapter_namespace: self.adapter_namespace.clone(),
            adapter_config_name: self.adapter_config_name.clone(),
            adapter_config_key: self.adapter_config_key.clone(),
            workload_api_version: self.workload_api_version.clone(),
            conflict_retries: self.conflict_retries,
            requeue_interval: Duration::from_secs(self.requeue_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install rustls crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&Application::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        log_format: cli.options.log_format,
        ..Default::default()
    })?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.options).await,
    }
}

/// Build a client from an explicit kubeconfig, else in-cluster/default discovery
async fn build_client(kubeconfig: Option<&PathBuf>) -> anyhow::Result<Client> {
    let Some(path) = kubeconfig else {
        return Client::try_default()
            .await
            .context("failed to create Kubernetes client");
    };

    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("invalid kubeconfig")?;
    Client::try_from(config).context("failed to create Kubernetes client")
}

/// Run the Application controller until SIGTERM/SIGINT
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let client = build_client(args.kubeconfig.as_ref()).await?;
    let config = args.controller_config();

    tracing::info!(
        adapter_config = %format!("{}/{}", config.adapter_namespace, config.adapter_config_name),
        key = %config.adapter_config_key,
        conflict_retries = config.conflict_retries,
        requeue_secs = config.requeue_interval.as_secs(),
        "Starting Application autoscaling controller"
    );

    let applications: Api<Application> = Api::all(client.clone());
    let hpas: Api<HorizontalPodAutoscaler> = Api::all(client.clone());
    let ctx = Arc::new(Context::new(client, config));

    Controller::new(applications, WatcherConfig::default())
        .owns(hpas, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Application reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Application reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Controller shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_library_config() {
        let cli = Cli::try_parse_from(["app-autoscaler"]).expect("parse");
        let config = cli.options.controller_config();
        let defaults = ControllerConfig::default();
        assert_eq!(config.conflict_retries, defaults.conflict_retries);
        assert_eq!(config.requeue_interval, defaults.requeue_interval);
        assert_eq!(config.workload_api_version, defaults.workload_api_version);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "app-autoscaler",
            "controller",
            "--adapter-namespace",
            "custom-metrics",
            "--conflict-retries",
            "8",
            "--log-format",
            "text",
        ])
        .expect("parse");
        assert!(matches!(cli.command, Some(Commands::Controller)));
        let config = cli.options.controller_config();
        assert_eq!(config.adapter_namespace, "custom-metrics");
        assert_eq!(config.conflict_retries, 8);
        assert_eq!(cli.options.log_format, LogFormat::Text);
    }
}
