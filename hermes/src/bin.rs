//! CLI entry point: load a `HermesConfig` from a JSON file and run one
//! session to completion, exiting with the code spec §6 assigns to the
//! final outcome.

use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use hermes_admin::HermesConfig;
use hermes_transport::Endpoint;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "hermes", about = "Distributed local real-time sensor-fusion broker")]
struct Cli {
    /// Path to a JSON-encoded HermesConfig.
    #[arg(long)]
    config: String,

    /// Host this broker's coordination socket binds on.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port this broker's coordination socket binds on.
    #[arg(long, default_value_t = 5590)]
    port: u16,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let raw = fs::read_to_string(&cli.config).with_context(|| format!("reading {}", cli.config))?;
    let config: HermesConfig = serde_json::from_str(&raw).with_context(|| format!("parsing {}", cli.config))?;

    let runtime = tokio::runtime::Runtime::new().context("building tokio runtime")?;
    let outcome = runtime.block_on(async move {
        let cancel = CancellationToken::new();
        let ctrl_c_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c_cancel.cancel();
            }
        });
        hermes::run_with_cancel(config, Endpoint::new(cli.host, cli.port), cancel).await
    });

    Ok(ExitCode::from(outcome.exit_code() as u8))
}
