use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use mapkubeapis_api::{MapOptions, MapOutcome};
use mapkubeapis_core::TracingReporter;
use mapkubeapis_kubehub::{Driver, KubeConfig};
use tracing::{error, info};

/// Map release deprecated or removed Kubernetes APIs in-place.
#[derive(Parser, Debug)]
#[command(name = "mapkubeapis", version, about = "Map deprecated or removed Kubernetes APIs in a Helm release")]
struct Cli {
    /// Release to map
    release: String,

    /// Simulate the mapping without writing a new release version
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Path to the API mapping file
    #[arg(long = "mapfile", default_value = "config/Map.yaml")]
    map_file: PathBuf,

    /// Namespace of the release
    #[arg(long = "namespace", env = "HELM_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Name of the kubeconfig context to use
    #[arg(long = "kube-context", env = "HELM_KUBECONTEXT")]
    kube_context: Option<String>,

    /// Path to the kubeconfig file
    #[arg(long = "kubeconfig", env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Release storage driver: secret or configmap
    #[arg(long = "driver", env = "HELM_DRIVER", default_value = "secret")]
    driver: String,

    /// Restore the latest release version to 'deployed' after an interrupted mapping
    #[arg(long = "reconcile", action = ArgAction::SetTrue, conflicts_with = "dry_run")]
    reconcile: bool,
}

fn init_tracing() {
    let env = std::env::var("MAPKUBEAPIS_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn options(cli: &Cli) -> Result<MapOptions> {
    // KUBECONFIG may hold a path list; the first entry wins
    let kubeconfig = cli
        .kubeconfig
        .as_ref()
        .and_then(|p| std::env::split_paths(p).next())
        .filter(|p| !p.as_os_str().is_empty());
    Ok(MapOptions {
        dry_run: cli.dry_run,
        kube_config: KubeConfig { context: cli.kube_context.clone(), file: kubeconfig },
        map_file: cli.map_file.clone(),
        release_name: cli.release.clone(),
        release_namespace: cli.namespace.clone(),
        driver: Driver::from_str(&cli.driver).context("invalid --driver")?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let opts = options(&cli)?;
    let reporter = TracingReporter;
    info!(release = %opts.release_name, namespace = %opts.release_namespace, dry_run = opts.dry_run, driver = %opts.driver, "mapkubeapis invoked");

    if cli.reconcile {
        match mapkubeapis_api::run_reconcile(&opts, &reporter).await {
            Ok(Some(restored)) => info!(version = %restored.version_name(), "release reconciled"),
            Ok(None) => {}
            Err(e) => {
                error!(error = ?e, "reconcile failed");
                return Err(e);
            }
        }
        return Ok(());
    }

    match mapkubeapis_api::run(&opts, &reporter).await {
        Ok(MapOutcome::Unchanged) => {}
        Ok(MapOutcome::DryRun { rewritten, removed }) => {
            info!(rewritten, removed, "dry run complete; release not modified")
        }
        Ok(MapOutcome::Updated { superseded, created }) => info!(superseded = %superseded, created = %created, "mapping complete"),
        Err(e) => {
            error!(error = ?e, "mapping failed");
            return Err(e);
        }
    }
    Ok(())
}
