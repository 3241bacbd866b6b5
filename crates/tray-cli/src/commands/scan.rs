//! Scan command implementation.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use tray_core::{BtleTransport, find_tags};

use crate::cli::ScanFormat;
use crate::format::{format_scan_json, format_scan_text};

pub async fn cmd_scan(timeout: u64, format: ScanFormat, quiet: bool) -> Result<()> {
    if !quiet {
        eprintln!("Scanning for ranging tags ({}s)...", timeout);
    }

    let transport = BtleTransport::new()
        .await
        .context("Failed to open Bluetooth adapter")?;
    let tags = find_tags(&transport, Duration::from_secs(timeout))
        .await
        .context("Failed to scan for tags")?;

    let content = match format {
        ScanFormat::Text => format_scan_text(&tags),
        ScanFormat::Json => format_scan_json(&tags)?,
    };

    let mut stdout = io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
