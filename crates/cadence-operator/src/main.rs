//! cadence operator - time-window scaling for Kubernetes Deployments

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kube::{Client, CustomResourceExt};

use cadence_common::crd::TimeWindowScaler;
use cadence_common::kube_utils::ensure_crd_installed;
use cadence_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use cadence_common::FIELD_MANAGER;
use cadence_scaler::ScalerConfig;

mod controller_runner;

/// cadence - scale Deployments on a time-of-day schedule
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about, long_about = None)]
struct Cli {
    /// Print the TimeWindowScaler CRD as YAML and exit
    #[arg(long)]
    crd: bool,

    /// Log line format: json or text
    #[arg(long, global = true, env = "CADENCE_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the TimeWindowScaler controller (default mode)
    Controller,
}

/// Controller settings
#[derive(Args, Debug, Clone)]
struct ControllerArgs {
    /// Only watch scalers, Deployments and ConfigMaps in this namespace
    #[arg(long, global = true, env = "CADENCE_WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Apply the TimeWindowScaler CRD before starting
    #[arg(long, global = true)]
    install_crd: bool,

    /// Seconds before a boundary to wake up
    #[arg(long, global = true, default_value_t = 10)]
    lead_time_secs: u64,

    /// Minimum seconds between boundary-driven evaluations
    #[arg(long, global = true, default_value_t = 30)]
    min_requeue_secs: u64,

    /// Seconds before retrying after a transient error or invalid configuration
    #[arg(long, global = true, default_value_t = 30)]
    error_backoff_secs: u64,

    /// Seconds before retrying a request the API server rejected
    #[arg(long, global = true, default_value_t = 300)]
    non_retryable_backoff_secs: u64,

    /// Seconds between checks while a target Deployment is missing
    #[arg(long, global = true, default_value_t = 300)]
    target_missing_backoff_secs: u64,
}

impl ControllerArgs {
    fn scaler_config(&self) -> ScalerConfig {
        ScalerConfig {
            lead_time: Duration::from_secs(self.lead_time_secs),
            min_requeue: Duration::from_secs(self.min_requeue_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            non_retryable_backoff: Duration::from_secs(self.non_retryable_backoff_secs),
            target_missing_backoff: Duration::from_secs(self.target_missing_backoff_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&TimeWindowScaler::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let telemetry = init_telemetry(TelemetryConfig {
        log_format: cli.log_format,
        ..Default::default()
    })?;
    if telemetry.is_exporting() {
        tracing::info!("Exporting traces and metrics over OTLP");
    }

    let result = match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.controller).await,
    };
    telemetry.shutdown();
    result
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if args.install_crd {
        tracing::info!("Installing TimeWindowScaler CRD...");
        ensure_crd_installed(&client, &TimeWindowScaler::crd(), FIELD_MANAGER)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install TimeWindowScaler CRD: {}", e))?;
    }

    match args.namespace.as_deref() {
        Some(ns) => tracing::info!(namespace = %ns, "Starting cadence controller"),
        None => tracing::info!("Starting cadence controller for all namespaces"),
    }

    controller_runner::build_scaler_controller(client, args.namespace.as_deref(), args.scaler_config())
        .await;

    tracing::info!("Controller stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_scaler_config() {
        let cli = Cli::try_parse_from(["cadence"]).unwrap();
        assert!(!cli.crd);
        assert!(cli.command.is_none());
        assert_eq!(cli.controller.scaler_config(), ScalerConfig::default());
    }

    #[test]
    fn controller_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cadence",
            "controller",
            "--namespace",
            "shop",
            "--lead-time-secs",
            "5",
            "--install-crd",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Controller)));
        assert_eq!(cli.controller.namespace.as_deref(), Some("shop"));
        assert!(cli.controller.install_crd);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.controller.scaler_config().lead_time, Duration::from_secs(5));
    }

    #[test]
    fn rejected_request_backoff_and_text_logs() {
        let cli = Cli::try_parse_from([
            "cadence",
            "--log-format",
            "text",
            "--non-retryable-backoff-secs",
            "600",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Text);
        assert_eq!(
            cli.controller.scaler_config().non_retryable_backoff,
            Duration::from_secs(600)
        );
    }

    #[test]
    fn crd_flag() {
        let cli = Cli::try_parse_from(["cadence", "--crd"]).unwrap();
        assert!(cli.crd);
    }

    #[test]
    fn crd_serializes_to_yaml() {
        let yaml = serde_yaml::to_string(&TimeWindowScaler::crd()).unwrap();
        assert!(yaml.contains("timewindowscalers.cadence.dev"));
        assert!(yaml.contains("shortNames"));
    }
}
