use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tray_cli::cli::{Cli, Commands};
use tray_cli::commands::{cmd_collect, cmd_scan};
use tray_cli::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --log-level wins, then --quiet/--verbose, then RUST_LOG
    let filter = if let Some(directive) = &cli.log_level {
        EnvFilter::try_new(directive)?
    } else if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Scan { timeout, format } => cmd_scan(timeout, format, cli.quiet).await,
        Commands::Collect(args) => {
            let mut config = Config::load_or_default(cli.config.as_deref())?;
            args.apply(&mut config);

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, shutting down");
                    ctrl_c.cancel();
                }
            });

            let summary = cmd_collect(&config, cancel).await?;
            if !cli.quiet {
                eprintln!(
                    "Collected {} record(s) in {} pass(es); {} eviction(s), {} reset(s)",
                    summary.records, summary.passes, summary.evictions, summary.resets
                );
            }
            Ok(())
        }
    }
}
