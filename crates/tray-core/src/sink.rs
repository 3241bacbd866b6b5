//! Record sinks.
//!
//! The collection loop hands every successful read to a [`RecordSink`].
//! This module provides an in-memory sink and a channel-forwarding sink;
//! file formats live in the command-line crate.

use async_trait::async_trait;
use tokio::sync::mpsc;

use tray_types::Record;

use crate::error::{Error, Result};

/// Destination for collected records.
#[async_trait]
pub trait RecordSink: Send {
    /// Accept one record.
    async fn write(&mut self, record: &Record) -> Result<()>;

    /// Flush buffered records. Called once at the end of every pass.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    async fn write(&mut self, record: &Record) -> Result<()> {
        (**self).write(record).await
    }

    async fn flush(&mut self) -> Result<()> {
        (**self).flush().await
    }
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Vec<Record>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far, in arrival order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records received.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records were received.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take the records out of the sink.
    pub fn take(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.records)
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write(&mut self, record: &Record) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Sink that forwards records over a bounded channel.
///
/// Writes wait for capacity, so a slow consumer slows the collection loop.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Record>,
}

impl ChannelSink {
    /// Create a sink and the receiver for its records.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Record>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Wrap an existing sender.
    pub fn from_sender(tx: mpsc::Sender<Record>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl RecordSink for ChannelSink {
    async fn write(&mut self, record: &Record) -> Result<()> {
        self.tx
            .send(record.clone())
            .await
            .map_err(|_| Error::sink("record receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use tray_types::{AnchorIds, Reading};

    fn record(address: &str) -> Record {
        Record::new(
            OffsetDateTime::UNIX_EPOCH,
            address,
            "tag",
            Reading::default(),
            AnchorIds::synthetic(),
        )
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.write(&record("AA:AA:AA:AA:AA:01")).await.unwrap();
        sink.write(&record("AA:AA:AA:AA:AA:02")).await.unwrap();
        sink.flush().await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[1].address(), "AA:AA:AA:AA:AA:02");
        assert_eq!(sink.take().len(), 2);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (mut sink, mut rx) = ChannelSink::new(4);
        sink.write(&record("AA:AA:AA:AA:AA:01")).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.address(), "AA:AA:AA:AA:AA:01");
    }

    #[tokio::test]
    async fn test_channel_sink_closed_receiver() {
        let (mut sink, rx) = ChannelSink::new(1);
        drop(rx);

        let err = sink.write(&record("AA:AA:AA:AA:AA:01")).await.unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
    }

    #[tokio::test]
    async fn test_boxed_sink() {
        let mut sink: Box<dyn RecordSink> = Box::new(MemorySink::new());
        sink.write(&record("AA:AA:AA:AA:AA:01")).await.unwrap();
        sink.flush().await.unwrap();
    }
}
