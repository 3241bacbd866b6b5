//! Command-line collector for tray sensor ranging tags.
//!
//! The `tray-sensor` binary discovers ranging tags over BLE, polls each one in
//! a loop and writes every reading as CSV or JSON lines.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | List ranging tags in range |
//! | `collect` | Discover tags and collect readings until interrupted |
//!
//! # Configuration
//!
//! Settings are read from `~/.config/tray-sensor/config.toml` (or the platform
//! equivalent, or the file given with `--config`). Command-line flags override
//! the file. See [`config`] for the file layout.
//!
//! # Examples
//!
//! ```bash
//! tray-sensor scan --timeout 5
//! tray-sensor collect --output-dir ./data --collection-period 600
//! tray-sensor collect --format json --max-passes 10
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;
pub mod sink;

pub use tray_core;
pub use tray_types;
