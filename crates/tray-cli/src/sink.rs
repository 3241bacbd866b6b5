//! File and stdout sinks for collected records.

use std::io::Write;

use async_trait::async_trait;

use tray_core::{Error, RecordSink, Result};
use tray_types::{AnchorIds, Record};

use crate::config::OutputFormat;
use crate::format::{format_record_csv_header, format_record_csv_line, format_record_json_line};

/// Writes records as CSV rows.
///
/// The header row is written before the first record.
pub struct CsvSink<W: Write + Send> {
    writer: W,
    anchors: AnchorIds,
    header_written: bool,
}

impl<W: Write + Send> CsvSink<W> {
    pub fn new(writer: W, anchors: AnchorIds) -> Self {
        Self {
            writer,
            anchors,
            header_written: false,
        }
    }

    /// Skip the header row, e.g. when appending to an existing file.
    #[must_use]
    pub fn without_header(mut self) -> Self {
        self.header_written = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> RecordSink for CsvSink<W> {
    async fn write(&mut self, record: &Record) -> Result<()> {
        if !self.header_written {
            self.writer
                .write_all(format_record_csv_header(&self.anchors).as_bytes())?;
            self.header_written = true;
        }
        let line = format_record_csv_line(record).map_err(|e| Error::sink(e.to_string()))?;
        self.writer.write_all(line.as_bytes())?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes records as newline-delimited JSON objects.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    async fn write(&mut self, record: &Record) -> Result<()> {
        let line = format_record_json_line(record).map_err(|e| Error::sink(e.to_string()))?;
        self.writer.write_all(line.as_bytes())?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Build the sink for `format` around `writer`.
pub fn record_sink<W: Write + Send + 'static>(
    format: OutputFormat,
    writer: W,
    anchors: AnchorIds,
) -> Box<dyn RecordSink> {
    match format {
        OutputFormat::Csv => Box::new(CsvSink::new(writer, anchors)),
        OutputFormat::Json => Box::new(JsonLinesSink::new(writer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::BufWriter;
    use time::OffsetDateTime;
    use tray_types::{ANCHOR_COUNT, Reading};

    fn record(address: &str, first: f32) -> Record {
        let mut ranges = [None; ANCHOR_COUNT];
        ranges[0] = Some(first);
        Record::new(
            OffsetDateTime::UNIX_EPOCH,
            address,
            "tray",
            Reading::new(ranges),
            AnchorIds::synthetic(),
        )
    }

    #[tokio::test]
    async fn test_csv_sink_writes_header_once() {
        let mut sink = CsvSink::new(Vec::new(), AnchorIds::synthetic());
        sink.write(&record("AA:AA:AA:AA:AA:01", 1.0)).await.unwrap();
        sink.write(&record("AA:AA:AA:AA:AA:02", 2.0)).await.unwrap();
        sink.flush().await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,mac_address,local_name,range_anchor00"));
        assert!(lines[1].starts_with("1970-01-01T00:00:00Z,AA:AA:AA:AA:AA:01,tray,1.0000,"));
        assert!(lines[2].contains("AA:AA:AA:AA:AA:02,tray,2.0000,"));
    }

    #[tokio::test]
    async fn test_csv_sink_without_header() {
        let mut sink = CsvSink::new(Vec::new(), AnchorIds::synthetic()).without_header();
        sink.write(&record("AA:AA:AA:AA:AA:01", 1.0)).await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(output.lines().count(), 1);
        assert!(!output.contains("mac_address"));
    }

    #[tokio::test]
    async fn test_csv_sink_no_records_no_output() {
        let mut sink = CsvSink::new(Vec::new(), AnchorIds::synthetic());
        sink.flush().await.unwrap();
        assert!(sink.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_json_lines_sink() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write(&record("AA:AA:AA:AA:AA:01", 1.25)).await.unwrap();
        sink.write(&record("AA:AA:AA:AA:AA:02", 3.5)).await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let values: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["mac_address"], "AA:AA:AA:AA:AA:01");
        assert_eq!(values[1]["ranges"][0]["range"], 3.5);
    }

    #[tokio::test]
    async fn test_csv_sink_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let file = fs::File::create(&path).unwrap();

        let mut sink = record_sink(
            OutputFormat::Csv,
            BufWriter::new(file),
            AnchorIds::synthetic(),
        );
        sink.write(&record("AA:AA:AA:AA:AA:01", 0.5)).await.unwrap();
        sink.flush().await.unwrap();
        drop(sink);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("0.5000"));
    }

    #[tokio::test]
    async fn test_write_error_maps_to_io() {
        struct BrokenWriter;

        impl Write for BrokenWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk full"))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut sink = JsonLinesSink::new(BrokenWriter);
        let err = sink.write(&record("AA:AA:AA:AA:AA:01", 1.0)).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
