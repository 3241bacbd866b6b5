//! Collect command implementation.
//!
//! Discovers tags once, then runs the collection loop until it is cancelled
//! (Ctrl-C), reaches its pass limit or hits a fatal error. The sink is flushed
//! on every exit path.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tray_core::{BleTransport, BtleTransport, RecordSink, RegistryConfig, RunSummary, TagRegistry};
use tray_types::AnchorIds;

use crate::config::{Config, OutputConfig};
use crate::format::output_file_path;
use crate::sink::record_sink;

pub async fn cmd_collect(config: &Config, cancel: CancellationToken) -> Result<RunSummary> {
    config.validate()?;
    let anchors = AnchorIds::resolve(config.collector.anchor_ids.as_deref())?;

    let (writer, path) = open_output(&config.output, OffsetDateTime::now_utc())?;
    if let Some(path) = &path {
        info!(path = %path.display(), "Writing records to file");
    }
    let sink = record_sink(config.output.format, writer, anchors);

    let transport = Arc::new(
        BtleTransport::new()
            .await
            .context("Failed to open Bluetooth adapter")?,
    );
    run_collection(transport, sink, config.registry_config(), &cancel).await
}

/// Open the record destination: a timestamped file when an output directory
/// is configured, stdout otherwise.
pub fn open_output(
    output: &OutputConfig,
    started: OffsetDateTime,
) -> Result<(Box<dyn Write + Send>, Option<PathBuf>)> {
    let Some(directory) = &output.directory else {
        return Ok((Box::new(io::stdout()), None));
    };

    fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create output directory: {}", directory.display()))?;
    let path = output_file_path(directory, &output.file_base, output.format, started)?;
    let file = fs::File::create(&path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    Ok((Box::new(BufWriter::new(file)), Some(path)))
}

/// Run discovery and the collection loop against `transport`.
pub async fn run_collection<T: BleTransport>(
    transport: Arc<T>,
    sink: Box<dyn RecordSink>,
    config: RegistryConfig,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let mut registry = TagRegistry::new(transport, sink, config);

    let discovered = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        admitted = registry.find_new_tags() => Some(admitted),
    };
    let result = match discovered {
        None => {
            registry.shutdown().await;
            Ok(RunSummary::default())
        }
        Some(Err(e)) => {
            registry.shutdown().await;
            Err(e)
        }
        Some(Ok(admitted)) => {
            info!(admitted, "Initial discovery complete");
            registry.run(cancel).await
        }
    };

    let flushed = registry.sink_mut().flush().await;
    let summary = result.context("Collection failed")?;
    flushed.context("Failed to flush output")?;
    Ok(summary)
}
