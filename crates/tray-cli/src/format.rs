//! Output formatting for records and scan results.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use tray_types::{Advertisement, AnchorIds, Record};

use crate::config::OutputFormat;

/// Escape a string for CSV output.
/// Wraps the value in quotes if it contains commas, quotes, or newlines.
/// Double quotes are escaped by doubling them.
#[must_use]
pub fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Header row for record CSV output.
///
/// Range columns are named `range_<anchor id>`, so synthetic ids give
/// `range_anchor00` through `range_anchor15`.
#[must_use]
pub fn format_record_csv_header(anchors: &AnchorIds) -> String {
    let mut columns = vec![
        "timestamp".to_string(),
        "mac_address".to_string(),
        "local_name".to_string(),
    ];
    columns.extend(anchors.iter().map(|id| csv_escape(&format!("range_{}", id))));
    format!("{}\n", columns.join(","))
}

/// One CSV row for a record. Absent ranges are left empty.
pub fn format_record_csv_line(record: &Record) -> Result<String> {
    let mut fields = vec![
        record.timestamp().format(&Rfc3339)?,
        csv_escape(record.address()),
        csv_escape(record.name()),
    ];
    fields.extend(
        record
            .reading()
            .ranges()
            .iter()
            .map(|range| range.map(|r| format!("{:.4}", r)).unwrap_or_default()),
    );
    Ok(format!("{}\n", fields.join(",")))
}

#[derive(Serialize)]
struct RangeJson<'a> {
    anchor_id: &'a str,
    range: Option<f32>,
}

#[derive(Serialize)]
struct RecordJson<'a> {
    timestamp: String,
    mac_address: &'a str,
    local_name: &'a str,
    ranges: Vec<RangeJson<'a>>,
}

/// One JSON object for a record, terminated by a newline.
pub fn format_record_json_line(record: &Record) -> Result<String> {
    let json = RecordJson {
        timestamp: record.timestamp().format(&Rfc3339)?,
        mac_address: record.address(),
        local_name: record.name(),
        ranges: record
            .anchors()
            .iter()
            .zip(record.reading().ranges().iter())
            .map(|(anchor_id, range)| RangeJson {
                anchor_id,
                range: *range,
            })
            .collect(),
    };
    Ok(format!("{}\n", serde_json::to_string(&json)?))
}

/// Output file for a collection run: `<dir>/<base>_<yymmdd_HHMMSS>.<ext>`.
pub fn output_file_path(
    directory: &Path,
    file_base: &str,
    format: OutputFormat,
    started: OffsetDateTime,
) -> Result<PathBuf> {
    let stamp = started.format(format_description!(
        "[year repr:last_two][month][day]_[hour][minute][second]"
    ))?;
    Ok(directory.join(format!("{}_{}.{}", file_base, stamp, format.extension())))
}

/// Text listing of discovered tags.
#[must_use]
pub fn format_scan_text(tags: &[Advertisement]) -> String {
    if tags.is_empty() {
        return "No ranging tags found.\n".to_string();
    }

    let mut output = format!("Found {} ranging tag(s):\n\n", tags.len());
    output.push_str(&format!("{:<20} {:<24} {:>6}\n", "ADDRESS", "NAME", "RSSI"));
    for tag in tags {
        let rssi = tag
            .rssi
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "{:<20} {:<24} {:>6}\n",
            tag.address,
            tag.local_name().unwrap_or("(unnamed)"),
            rssi
        ));
    }
    output
}

#[derive(Serialize)]
struct ScanJson<'a> {
    address: &'a str,
    name: Option<&'a str>,
    rssi: Option<i16>,
}

/// JSON array of discovered tags.
pub fn format_scan_json(tags: &[Advertisement]) -> Result<String> {
    let entries: Vec<_> = tags
        .iter()
        .map(|tag| ScanJson {
            address: &tag.address,
            name: tag.local_name(),
            rssi: tag.rssi,
        })
        .collect();
    Ok(format!("{}\n", serde_json::to_string_pretty(&entries)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use tray_types::{ANCHOR_COUNT, Reading};

    fn record(ranges: [Option<f32>; ANCHOR_COUNT]) -> Record {
        Record::new(
            datetime!(2024-03-05 14:07:09 UTC),
            "AA:AA:AA:AA:AA:01",
            "tray-01",
            Reading::new(ranges),
            AnchorIds::synthetic(),
        )
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_header_synthetic_anchors() {
        let header = format_record_csv_header(&AnchorIds::synthetic());
        let columns: Vec<_> = header.trim_end().split(',').collect();

        assert_eq!(columns.len(), 3 + ANCHOR_COUNT);
        assert_eq!(&columns[..3], &["timestamp", "mac_address", "local_name"]);
        assert_eq!(columns[3], "range_anchor00");
        assert_eq!(columns[18], "range_anchor15");
    }

    #[test]
    fn test_csv_header_explicit_anchors() {
        let ids = (0..ANCHOR_COUNT).map(|i| format!("wall-{}", i)).collect();
        let anchors = AnchorIds::from_list(ids).unwrap();

        let header = format_record_csv_header(&anchors);
        assert!(header.contains(",range_wall-0,"));
        assert!(header.ends_with("range_wall-15\n"));
    }

    #[test]
    fn test_csv_line_formats_ranges() {
        let mut ranges = [None; ANCHOR_COUNT];
        ranges[0] = Some(1.5);
        ranges[2] = Some(0.123_456);

        let line = format_record_csv_line(&record(ranges)).unwrap();
        let fields: Vec<_> = line.trim_end().split(',').collect();

        assert_eq!(fields.len(), 3 + ANCHOR_COUNT);
        assert_eq!(fields[0], "2024-03-05T14:07:09Z");
        assert_eq!(fields[1], "AA:AA:AA:AA:AA:01");
        assert_eq!(fields[2], "tray-01");
        assert_eq!(fields[3], "1.5000");
        assert_eq!(fields[4], "");
        assert_eq!(fields[5], "0.1235");
        assert!(fields[6..].iter().all(|f| f.is_empty()));
    }

    #[test]
    fn test_json_line() {
        let mut ranges = [None; ANCHOR_COUNT];
        ranges[1] = Some(2.0);

        let line = format_record_json_line(&record(ranges)).unwrap();
        assert!(line.ends_with('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["mac_address"], "AA:AA:AA:AA:AA:01");
        assert_eq!(value["local_name"], "tray-01");
        assert_eq!(value["ranges"].as_array().unwrap().len(), ANCHOR_COUNT);
        assert_eq!(value["ranges"][0]["anchor_id"], "anchor00");
        assert!(value["ranges"][0]["range"].is_null());
        assert_eq!(value["ranges"][1]["range"], 2.0);
    }

    #[test]
    fn test_output_file_path() {
        let path = output_file_path(
            Path::new("/data"),
            "tray_sensor_data",
            OutputFormat::Csv,
            datetime!(2024-03-05 14:07:09 UTC),
        )
        .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/data/tray_sensor_data_240305_140709.csv")
        );

        let path = output_file_path(
            Path::new("out"),
            "run",
            OutputFormat::Json,
            datetime!(2031-12-31 23:59:58 UTC),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("out/run_311231_235958.jsonl"));
    }

    #[test]
    fn test_scan_text() {
        assert_eq!(format_scan_text(&[]), "No ranging tags found.\n");

        let tags = vec![
            Advertisement::new("AA:AA:AA:AA:AA:01")
                .with_rssi(-60)
                .with_field(0x09, "tray-01"),
            Advertisement::new("AA:AA:AA:AA:AA:02"),
        ];
        let text = format_scan_text(&tags);
        assert!(text.starts_with("Found 2 ranging tag(s)"));
        assert!(text.contains("tray-01"));
        assert!(text.contains("-60"));
        assert!(text.contains("(unnamed)"));
    }

    #[test]
    fn test_scan_json() {
        let tags = vec![Advertisement::new("AA:AA:AA:AA:AA:01").with_field(0x09, "tray-01")];
        let json = format_scan_json(&tags).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["address"], "AA:AA:AA:AA:AA:01");
        assert_eq!(value[0]["name"], "tray-01");
        assert!(value[0]["rssi"].is_null());
    }
}
