//! csri-bridge CLI: run the canonical observation sequences against a
//! reasoning service and report how many steps succeeded.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use miette::Result;

use csri_bridge::bridge::Bridge;
use csri_bridge::config::BridgeConfig;
use csri_bridge::demo::{DemoRunner, DemoSummary, Domain};
use csri_bridge::link::Link;
use csri_bridge::link::memory::MemoryBackend;

#[derive(Parser)]
#[command(
    name = "csri-bridge",
    version,
    about = "Submit observations to a reasoning service and query derived beliefs"
)]
struct Cli {
    /// Bridge config file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Service host, overriding config and CSRI_HOST.
    #[arg(long)]
    host: Option<String>,

    /// Service port, overriding config and CSRI_PORT.
    #[arg(long)]
    port: Option<u16>,

    /// Which domain sequence to run.
    #[arg(long, value_enum, default_value = "all")]
    domain: Domain,

    /// Talk to a remote service or an in-process backend.
    #[arg(long, value_enum, default_value = "remote")]
    backend: Backend,

    /// Per-request timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Remote,
    Memory,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    }
    .apply_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ms) = cli.timeout_ms {
        config.request_timeout_ms = ms;
    }

    let summary = match cli.backend {
        Backend::Remote => {
            config.endpoint()?;
            run(Bridge::remote(config)?, cli.domain).await
        }
        Backend::Memory => {
            let backend = MemoryBackend::new();
            run(Bridge::in_memory(&backend, config), cli.domain).await
        }
    };

    println!();
    for step in &summary.steps {
        let mark = if step.success { "ok  " } else { "FAIL" };
        println!("  {mark} [{}] {}: {}", step.domain, step.step, step.detail);
    }
    println!();
    println!("{summary}");

    Ok(if summary.is_full_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run<L: Link>(bridge: Bridge<L>, domain: Domain) -> DemoSummary {
    tracing::info!(endpoint = %bridge.endpoint(), %domain, "starting");

    if let Err(e) = bridge.try_connect().await {
        tracing::warn!(error = %e, "initial connect failed, each step will retry");
    }

    let summary = DemoRunner::new(bridge.clone()).run(domain).await;
    bridge.disconnect().await;
    summary
}
