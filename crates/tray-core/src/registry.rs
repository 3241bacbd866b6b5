//! Tag membership and the collection loop.
//!
//! [`TagRegistry`] owns every connected [`TagDevice`], polls them one after
//! another and hands each reading to a [`RecordSink`]. Membership changes in
//! three ways only:
//!
//! - **Refresh** ([`TagRegistry::find_new_tags`]) admits tags seen in a scan
//!   that are not yet tracked.
//! - **Eviction** drops tags whose read failed, at the end of the pass.
//! - **Reset** ([`TagRegistry::reset`]) closes every tag and rebuilds
//!   membership from a fresh scan. The collection loop does this once per
//!   collection period.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tray_types::{AnchorIds, Record};

use crate::error::Result;
use crate::filter::find_tags;
use crate::retry::RetryConfig;
use crate::sink::RecordSink;
use crate::tag::TagDevice;
use crate::transport::BleTransport;

/// Default scan duration for membership refresh.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time between full resets.
pub const DEFAULT_COLLECTION_PERIOD: Duration = Duration::from_secs(300);

/// Default pause between passes while no tag is tracked.
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_secs(1);

/// Configuration for a [`TagRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// How long each discovery scan runs.
    pub scan_timeout: Duration,
    /// Time after which all tags are dropped and rediscovered.
    pub collection_period: Duration,
    /// Pause between passes while membership is empty.
    pub idle_delay: Duration,
    /// Stop the loop after this many passes.
    pub max_passes: Option<u64>,
    /// Explicit anchor ids bound to the reading slots.
    pub anchor_ids: Option<Vec<String>>,
    /// Backoff for the initial connection to a tag.
    pub connect_retry: RetryConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            collection_period: DEFAULT_COLLECTION_PERIOD,
            idle_delay: DEFAULT_IDLE_DELAY,
            max_passes: None,
            anchor_ids: None,
            connect_retry: RetryConfig::for_connect(),
        }
    }
}

impl RegistryConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan timeout.
    #[must_use]
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the collection period.
    #[must_use]
    pub fn collection_period(mut self, period: Duration) -> Self {
        self.collection_period = period;
        self
    }

    /// Set the idle delay.
    #[must_use]
    pub fn idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    /// Stop after `passes` passes.
    #[must_use]
    pub fn max_passes(mut self, passes: u64) -> Self {
        self.max_passes = Some(passes);
        self
    }

    /// Bind explicit anchor ids to the reading slots.
    #[must_use]
    pub fn anchor_ids(mut self, ids: Vec<String>) -> Self {
        self.anchor_ids = Some(ids);
        self
    }

    /// Set the connect retry policy.
    #[must_use]
    pub fn connect_retry(mut self, retry: RetryConfig) -> Self {
        self.connect_retry = retry;
        self
    }
}

/// Outcome of one pass over the tracked tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    /// Records accepted by the sink.
    pub records: usize,
    /// Records the sink rejected.
    pub sink_failures: usize,
    /// Addresses evicted at the end of the pass.
    pub evicted: Vec<String>,
}

/// Outcome of a collection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Passes completed, including idle passes.
    pub passes: u64,
    /// Records accepted by the sink.
    pub records: u64,
    /// Tags evicted after a failed read.
    pub evictions: u64,
    /// Full resets performed.
    pub resets: u64,
}

/// Owns the tracked tags and drives the collection loop.
pub struct TagRegistry<T: BleTransport, S> {
    transport: Arc<T>,
    sink: S,
    config: RegistryConfig,
    tags: BTreeMap<String, TagDevice<T>>,
}

impl<T: BleTransport, S> std::fmt::Debug for TagRegistry<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagRegistry")
            .field("config", &self.config)
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<T: BleTransport, S: RecordSink> TagRegistry<T, S> {
    /// Create an empty registry.
    pub fn new(transport: Arc<T>, sink: S, config: RegistryConfig) -> Self {
        Self {
            transport,
            sink,
            config,
            tags: BTreeMap::new(),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The sink records are written to.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Addresses of the tracked tags, in address order.
    pub fn addresses(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }

    /// Number of tracked tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether no tag is tracked.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Whether a tag is tracked.
    pub fn contains(&self, address: &str) -> bool {
        self.tags.contains_key(address)
    }

    /// Scan and admit every tag not yet tracked.
    ///
    /// Candidates that fail to connect are skipped; they are tried again on
    /// the next refresh. Returns the number of tags admitted.
    ///
    /// # Errors
    ///
    /// Only adapter failures are returned.
    pub async fn find_new_tags(&mut self) -> Result<usize> {
        let candidates = find_tags(self.transport.as_ref(), self.config.scan_timeout).await?;

        let mut admitted = 0;
        for advertisement in candidates {
            if self.tags.contains_key(&advertisement.address) {
                continue;
            }

            let address = advertisement.address.clone();
            match TagDevice::connect(
                Arc::clone(&self.transport),
                advertisement,
                &self.config.connect_retry,
            )
            .await
            {
                Ok(tag) => {
                    info!(address = %address, name = %tag.name(), "Admitted tag");
                    self.tags.insert(address, tag);
                    admitted += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    info!(address = %address, error = %e, "Skipping tag candidate");
                }
            }
        }

        debug!(admitted, tracked = self.tags.len(), "Membership refreshed");
        Ok(admitted)
    }

    /// Read every tracked tag once.
    ///
    /// Each successful read becomes one [`Record`]. Tags whose read fails are
    /// closed and evicted after the last tag has been read.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AnchorCountMismatch`] before reading anything
    /// if the configured anchor id list does not have one id per slot.
    pub async fn poll_once(&mut self) -> Result<PassSummary> {
        let anchors = AnchorIds::resolve(self.config.anchor_ids.as_deref())?;

        let mut summary = PassSummary::default();
        for (address, tag) in self.tags.iter_mut() {
            match tag.read().await {
                Ok(reading) => {
                    let record = Record::new(
                        OffsetDateTime::now_utc(),
                        address.as_str(),
                        tag.name(),
                        reading,
                        anchors.clone(),
                    );
                    debug!(address = %address, reading = %reading, "Read tag");
                    match self.sink.write(&record).await {
                        Ok(()) => summary.records += 1,
                        Err(e) => {
                            error!(address = %address, error = %e, "Failed to write record");
                            summary.sink_failures += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(address = %address, error = %e, "Error reading tag, evicting");
                    tag.close().await;
                    summary.evicted.push(address.clone());
                }
            }
        }

        for address in &summary.evicted {
            self.tags.remove(address);
        }

        if let Err(e) = self.sink.flush().await {
            error!(error = %e, "Failed to flush records");
        }

        Ok(summary)
    }

    /// Close every tracked tag, then rebuild membership from a fresh scan.
    pub async fn reset(&mut self) -> Result<usize> {
        info!(tracked = self.tags.len(), "Resetting tag membership");
        self.shutdown().await;
        self.find_new_tags().await
    }

    /// Close every tracked tag and clear membership.
    pub async fn shutdown(&mut self) {
        for (_, mut tag) in std::mem::take(&mut self.tags) {
            tag.close().await;
        }
    }

    /// Run the collection loop until cancelled.
    ///
    /// Each iteration polls every tracked tag (or idles for the configured
    /// delay when there is none) and performs a [`reset`](Self::reset) once
    /// the collection period has elapsed since the last one. The loop also
    /// stops after `max_passes` passes if configured.
    ///
    /// Every tag is closed before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Adapter failures and an anchor id count mismatch end the run.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let result = self.collect(cancel, &mut summary).await;
        self.shutdown().await;

        match result {
            Ok(()) => {
                info!(
                    passes = summary.passes,
                    records = summary.records,
                    evictions = summary.evictions,
                    resets = summary.resets,
                    "Collection finished"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "Collection aborted");
                Err(e)
            }
        }
    }

    async fn collect(&mut self, cancel: &CancellationToken, summary: &mut RunSummary) -> Result<()> {
        AnchorIds::resolve(self.config.anchor_ids.as_deref())?;
        let mut last_refresh = Instant::now();

        loop {
            if cancel.is_cancelled() {
                info!("Collection cancelled");
                return Ok(());
            }
            if self
                .config
                .max_passes
                .is_some_and(|max| summary.passes >= max)
            {
                return Ok(());
            }

            if self.tags.is_empty() {
                debug!(delay = ?self.config.idle_delay, "No tags tracked, idling");
                tokio::select! {
                    _ = cancel.cancelled() => continue,
                    _ = sleep(self.config.idle_delay) => {}
                }
            } else {
                let pass = tokio::select! {
                    _ = cancel.cancelled() => continue,
                    pass = self.poll_once() => pass?,
                };
                summary.records += pass.records as u64;
                summary.evictions += pass.evicted.len() as u64;
            }
            summary.passes += 1;

            if last_refresh.elapsed() >= self.config.collection_period {
                tokio::select! {
                    _ = cancel.cancelled() => continue,
                    admitted = self.reset() => { admitted?; }
                }
                summary.resets += 1;
                last_refresh = Instant::now();
            }
        }
    }
}
