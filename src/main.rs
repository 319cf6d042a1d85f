use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use booster_harness::cluster::kubers::KubeRsBased;
use booster_harness::configuration;
use booster_harness::Lifecycle;

/// Deploys an application and its supporting bundles into the current
/// namespace, waits for it to come up and tears everything down again.
#[derive(Parser, Debug)]
#[command(name = "booster-harness", version, about, long_about = None)]
struct Cli {
    /// Run configuration file.
    #[arg(short = 'f', long = "config", default_value = "harness.yml")]
    config_file: PathBuf,

    /// Scale the application to this many replicas once it is ready.
    #[arg(long)]
    replicas: Option<u32>,

    /// Leave the deployed objects in place instead of cleaning up.
    #[arg(long)]
    keep: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = configuration::load_from_yaml(&cli.config_file)
        .with_context(|| format!("loading {}", cli.config_file.display()))?;

    let cluster = Arc::new(KubeRsBased::connect(config.context.clone()).await?);
    let mut lifecycle = Lifecycle::new(cluster);
    if let Some(name) = configuration::application_override(&config) {
        lifecycle = lifecycle.with_application_name(&name);
    }
    info!(namespace = %lifecycle.namespace(), "connected");

    for bundle in &config.bundles {
        lifecycle.deploy(&bundle.name, &bundle.bundle).await?;
    }
    lifecycle
        .deploy_application_from(&config.application.bundle)
        .await?;
    lifecycle.await_application_readiness_or_fail().await?;
    if let Some(url) = lifecycle.base_url() {
        info!(url = %url, "application ready");
    }

    if let Some(replicas) = cli.replicas {
        lifecycle.scale(replicas).await?;
    }

    if cli.keep {
        info!("leaving deployed objects in place");
    } else {
        lifecycle.cleanup().await?;
    }
    Ok(())
}
