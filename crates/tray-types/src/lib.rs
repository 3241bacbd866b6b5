//! Platform-agnostic types for Wildflower tray sensor ranging tags.
//!
//! This crate provides the protocol constants and data types shared by the
//! BLE engine (tray-core) and the command-line collector (tray-cli).
//!
//! # Features
//!
//! - Ranging payload codec ([`Reading`])
//! - Advertisement model ([`Advertisement`], [`AdField`])
//! - Output records ([`Record`], [`AnchorRange`], [`AnchorIds`])
//! - UUID and AD type constants
//! - Error types for data parsing
//!
//! # Example
//!
//! ```
//! use tray_types::{RANGING_PAYLOAD_BYTES, Reading};
//!
//! let payload = [0u8; RANGING_PAYLOAD_BYTES];
//! let reading = Reading::from_bytes(&payload).unwrap();
//! assert_eq!(reading.present_count(), 16);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    ABSENT_SENTINEL, ANCHOR_COUNT, AdField, Advertisement, AnchorIds, AnchorRange,
    RANGING_PAYLOAD_BYTES, Reading, Record, SLOT_BYTES,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Payload captured from a tag on the bench (all sixteen anchors in range).
    const BENCH_PAYLOAD: [u8; 64] = [
        0x78, 0x8A, 0x93, 0x40, 0x14, 0x1B, 0x83, 0x40, 0x62, 0x81, 0x82, 0x40, 0xCF, 0xA7, 0x82,
        0x40, 0x26, 0x3D, 0x90, 0x40, 0xAD, 0x3C, 0x8D, 0x40, 0x51, 0xD7, 0x93, 0x40, 0x0C, 0x64,
        0x93, 0x40, 0xA8, 0x5E, 0x42, 0x40, 0x26, 0x6B, 0x40, 0x40, 0x60, 0x7C, 0x5C, 0x40, 0x46,
        0xC8, 0x56, 0x40, 0xCD, 0xC7, 0x53, 0x40, 0xB9, 0x1F, 0x49, 0x40, 0x16, 0xFD, 0x60, 0x40,
        0xAB, 0x4E, 0x7F, 0x40,
    ];

    fn payload_with(slots: &[(usize, [u8; 4])]) -> [u8; 64] {
        let mut payload = [0u8; 64];
        for (slot, raw) in slots {
            payload[slot * 4..slot * 4 + 4].copy_from_slice(raw);
        }
        payload
    }

    // --- Reading decoding ---

    #[test]
    fn test_decode_bench_payload() {
        let reading = Reading::from_bytes(&BENCH_PAYLOAD).unwrap();

        assert_eq!(reading.present_count(), ANCHOR_COUNT);
        assert!((reading.get(0).unwrap() - 4.6107).abs() < 1e-3);
        assert!((reading.get(8).unwrap() - 3.0370).abs() < 1e-3);
        assert!((reading.get(15).unwrap() - 3.9892).abs() < 1e-3);
    }

    #[test]
    fn test_decode_slot_order_is_anchor_zero_first() {
        let payload = payload_with(&[(0, 1.0f32.to_le_bytes()), (15, 16.0f32.to_le_bytes())]);
        let reading = Reading::from_bytes(&payload).unwrap();

        assert_eq!(reading.get(0), Some(1.0));
        assert_eq!(reading.get(15), Some(16.0));
        assert_eq!(reading.get(16), None);
    }

    #[test]
    fn test_decode_sentinel_slots_are_absent() {
        let payload = payload_with(&[(3, ABSENT_SENTINEL), (9, ABSENT_SENTINEL)]);
        let reading = Reading::from_bytes(&payload).unwrap();

        assert_eq!(reading.get(3), None);
        assert_eq!(reading.get(9), None);
        assert_eq!(reading.get(4), Some(0.0));
        assert_eq!(reading.present_count(), 14);
    }

    #[test]
    fn test_decode_all_absent() {
        let payload: Vec<u8> = ABSENT_SENTINEL.repeat(ANCHOR_COUNT);
        let reading = Reading::from_bytes(&payload).unwrap();

        assert_eq!(reading.present_count(), 0);
        assert_eq!(reading, Reading::default());
    }

    #[test]
    fn test_decode_near_sentinel_is_present() {
        // Same bytes in the opposite order are an ordinary float.
        let payload = payload_with(&[(0, [0xBA, 0xAA, 0xAA, 0xD1])]);
        let reading = Reading::from_bytes(&payload).unwrap();

        assert!(reading.get(0).is_some());
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        let err = Reading::from_bytes(&BENCH_PAYLOAD[..60]).unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidLength {
                expected: 64,
                actual: 60
            }
        );
        assert!(err.to_string().contains("expected 64 bytes, got 60"));
    }

    #[test]
    fn test_decode_rejects_long_payload() {
        let mut payload = BENCH_PAYLOAD.to_vec();
        payload.extend_from_slice(&[0, 0, 0, 0]);

        assert!(matches!(
            Reading::from_bytes(&payload),
            Err(ParseError::InvalidLength { actual: 68, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        assert!(Reading::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_encode_writes_sentinel_for_absent() {
        let mut ranges = [Some(2.5f32); ANCHOR_COUNT];
        ranges[7] = None;
        let bytes = Reading::new(ranges).to_bytes();

        assert_eq!(&bytes[28..32], &ABSENT_SENTINEL);
        assert_eq!(&bytes[0..4], &2.5f32.to_le_bytes());
    }

    #[test]
    fn test_reading_display() {
        let mut ranges = [None; ANCHOR_COUNT];
        ranges[0] = Some(1.23456);
        let text = Reading::new(ranges).to_string();

        assert!(text.starts_with("[1.235, -"));
        assert!(text.ends_with("-]"));
    }

    proptest! {
        #[test]
        fn prop_bytes_survive_decode_encode(raw in proptest::collection::vec(any::<u8>(), 64)) {
            let reading = Reading::from_bytes(&raw).unwrap();
            prop_assert_eq!(reading.to_bytes().to_vec(), raw);
        }

        #[test]
        fn prop_wrong_length_is_rejected(len in 0usize..256) {
            prop_assume!(len != RANGING_PAYLOAD_BYTES);
            let raw = vec![0u8; len];
            let is_invalid_length = matches!(
                Reading::from_bytes(&raw),
                Err(ParseError::InvalidLength { .. })
            );
            prop_assert!(is_invalid_length);
        }

        #[test]
        fn prop_non_sentinel_slot_is_float_bits(raw in any::<[u8; 4]>()) {
            prop_assume!(raw != ABSENT_SENTINEL);
            let payload = payload_with(&[(5, raw)]);
            let reading = Reading::from_bytes(&payload).unwrap();
            prop_assert_eq!(reading.get(5).map(f32::to_bits), Some(u32::from_le_bytes(raw)));
        }
    }

    // --- Anchor ids ---

    #[test]
    fn test_synthetic_anchor_ids() {
        let anchors = AnchorIds::synthetic();
        assert_eq!(anchors.get(0), Some("anchor00"));
        assert_eq!(anchors.get(15), Some("anchor15"));
        assert_eq!(anchors.iter().count(), ANCHOR_COUNT);
    }

    #[test]
    fn test_explicit_anchor_ids_must_match_slot_count() {
        let ids: Vec<String> = (0..15).map(|i| format!("A{}", i)).collect();
        assert_eq!(
            AnchorIds::from_list(ids),
            Err(ParseError::AnchorCountMismatch {
                expected: 16,
                actual: 15
            })
        );

        let ids: Vec<String> = (0..16).map(|i| format!("A{}", i)).collect();
        let anchors = AnchorIds::from_list(ids).unwrap();
        assert_eq!(anchors.get(3), Some("A3"));
    }

    #[test]
    fn test_resolve_without_list_is_synthetic() {
        assert_eq!(AnchorIds::resolve(None).unwrap(), AnchorIds::synthetic());
    }

    // --- Advertisement ---

    #[test]
    fn test_advertisement_local_name() {
        let adv = Advertisement::new("AA:AA:AA:AA:AA:01")
            .with_field(0x01, "06")
            .with_field(0x09, "tag-01");

        assert_eq!(adv.local_name(), Some("tag-01"));
        assert_eq!(adv.fields[1].description, "Complete Local Name");
    }

    #[test]
    fn test_advertisement_without_name() {
        let adv = Advertisement::new("AA:AA:AA:AA:AA:01").with_field(0x03, "x");
        assert_eq!(adv.local_name(), None);
    }

    // --- Record ---

    #[test]
    fn test_record_anchor_ranges_skip_absent() {
        let mut ranges = [None; ANCHOR_COUNT];
        ranges[2] = Some(1.5);
        ranges[10] = Some(4.25);
        let record = Record::new(
            time::OffsetDateTime::UNIX_EPOCH,
            "AA:AA:AA:AA:AA:01",
            "tag-01",
            Reading::new(ranges),
            AnchorIds::synthetic(),
        );

        let expanded = record.anchor_ranges();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].device_name, "tag-01");
        assert_eq!(expanded[0].anchor_id, "anchor02");
        assert_eq!(expanded[0].range, 1.5);
        assert_eq!(expanded[1].anchor_id, "anchor10");
    }

    #[test]
    fn test_record_serializes_reading_slots() {
        let record = Record::new(
            time::OffsetDateTime::UNIX_EPOCH,
            "AA:AA:AA:AA:AA:01",
            "tag-01",
            Reading::default(),
            AnchorIds::synthetic(),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["address"], "AA:AA:AA:AA:AA:01");
        assert_eq!(json["reading"]["ranges"].as_array().unwrap().len(), 16);
        assert!(json["reading"]["ranges"][0].is_null());
    }
}
