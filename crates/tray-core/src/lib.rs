//! Discovery and collection engine for tray sensor ranging tags.
//!
//! This crate finds ranging tags from their BLE advertisements, keeps a
//! connection to each, and polls them in a loop that survives stale links
//! and tags dropping out of range.
//!
//! # Features
//!
//! - **Discovery**: pick ranging tags out of a BLE scan
//! - **Self-healing reads**: one reconnect-and-retry per failed read, with
//!   one-shot repair of the service and characteristic lookups
//! - **Collection loop**: end-of-pass eviction of failed tags and a full
//!   rediscovery once per collection period
//! - **Pluggable transport**: `btleplug` in production, [`MockTransport`] in
//!   tests
//! - **Sinks**: every successful read is handed to a [`RecordSink`]
//!
//! # Platform Differences
//!
//! Tags are keyed by Bluetooth MAC address on Linux and Windows. On macOS,
//! where CoreBluetooth hides the MAC address, the peripheral UUID is used
//! instead.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tray_core::{BtleTransport, MemorySink, RegistryConfig, TagRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BtleTransport::new().await?);
//!     let mut registry = TagRegistry::new(transport, MemorySink::new(), RegistryConfig::new());
//!
//!     registry.find_new_tags().await?;
//!     let summary = registry.run(&CancellationToken::new()).await?;
//!     println!("Collected {} records", summary.records);
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod error;
pub mod filter;
pub mod mock;
pub mod registry;
pub mod retry;
pub mod sink;
pub mod tag;
pub mod transport;
pub mod util;

pub use tray_types::uuid;

pub use btle::{BtleTransport, ConnectionConfig};
pub use error::{Error, Result};
pub use filter::{find_tags, is_tag_advertisement};
pub use mock::MockTransport;
pub use registry::{PassSummary, RegistryConfig, RunSummary, TagRegistry};
pub use retry::{RetryConfig, with_retry};
pub use sink::{ChannelSink, MemorySink, RecordSink};
pub use tag::{TagDevice, TagState};
pub use transport::BleTransport;

pub use tray_types::{Advertisement, AnchorIds, AnchorRange, Reading, Record};
