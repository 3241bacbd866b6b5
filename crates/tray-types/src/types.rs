//! Core types for tray sensor ranging data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ParseError, ParseResult};
use crate::uuid::{COMPLETE_LOCAL_NAME_TYPE_CODE, ad_type_description};

/// Number of anchor slots in every ranging payload.
pub const ANCHOR_COUNT: usize = 16;

/// Size in bytes of one encoded anchor slot (a little-endian `f32`).
pub const SLOT_BYTES: usize = 4;

/// Exact size of the ranging characteristic payload.
pub const RANGING_PAYLOAD_BYTES: usize = ANCHOR_COUNT * SLOT_BYTES;

/// Raw slot value, in transmitted byte order, that marks an anchor with no
/// distance measurement.
pub const ABSENT_SENTINEL: [u8; SLOT_BYTES] = [0xD1, 0xAA, 0xAA, 0xBA];

/// A single advertising data field: `(type code, description, value)`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdField {
    /// AD type code (e.g. `0x09` for the complete local name).
    pub type_code: u8,
    /// Human-readable description of the type code.
    pub description: String,
    /// Field value rendered as text.
    pub value: String,
}

impl AdField {
    /// Create a field, filling in the standard description for `type_code`.
    pub fn new(type_code: u8, value: impl Into<String>) -> Self {
        Self {
            type_code,
            description: ad_type_description(type_code).to_string(),
            value: value.into(),
        }
    }
}

/// One advertisement observed during a scan.
///
/// Advertisements are ephemeral: they are produced by a scan and consumed
/// immediately by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Advertisement {
    /// Radio address of the advertiser (MAC address, or platform identifier
    /// where the MAC is hidden).
    pub address: String,
    /// Received signal strength in dBm, if reported.
    pub rssi: Option<i16>,
    /// Advertising data fields in the order they were reported.
    pub fields: Vec<AdField>,
}

impl Advertisement {
    /// Create an advertisement with no fields.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            rssi: None,
            fields: Vec::new(),
        }
    }

    /// Set the RSSI.
    #[must_use]
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Append an advertising data field.
    #[must_use]
    pub fn with_field(mut self, type_code: u8, value: impl Into<String>) -> Self {
        self.fields.push(AdField::new(type_code, value));
        self
    }

    /// Iterate over the values of every field with the given type code.
    pub fn values(&self, type_code: u8) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(move |f| f.type_code == type_code)
            .map(|f| f.value.as_str())
    }

    /// The complete local name, if advertised.
    pub fn local_name(&self) -> Option<&str> {
        self.values(COMPLETE_LOCAL_NAME_TYPE_CODE).next()
    }
}

/// One ranging measurement: a distance per anchor slot.
///
/// A slot is `None` when the tag reported the [`ABSENT_SENTINEL`] for that
/// anchor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    ranges: [Option<f32>; ANCHOR_COUNT],
}

impl Reading {
    /// Create a reading from per-anchor ranges.
    pub fn new(ranges: [Option<f32>; ANCHOR_COUNT]) -> Self {
        Self { ranges }
    }

    /// Decode a reading from the raw ranging characteristic payload.
    ///
    /// The payload must be exactly [`RANGING_PAYLOAD_BYTES`] long: sixteen
    /// little-endian `f32` values, anchor 0 first.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidLength`] for any other length. No other
    /// decode failure exists, since every bit pattern is a valid `f32`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tray_types::{ABSENT_SENTINEL, Reading};
    ///
    /// let mut payload = [0u8; 64];
    /// payload[..4].copy_from_slice(&1.5f32.to_le_bytes());
    /// payload[4..8].copy_from_slice(&ABSENT_SENTINEL);
    ///
    /// let reading = Reading::from_bytes(&payload).unwrap();
    /// assert_eq!(reading.get(0), Some(1.5));
    /// assert_eq!(reading.get(1), None);
    /// assert_eq!(reading.get(2), Some(0.0));
    /// ```
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        use bytes::Buf;

        if data.len() != RANGING_PAYLOAD_BYTES {
            return Err(ParseError::InvalidLength {
                expected: RANGING_PAYLOAD_BYTES,
                actual: data.len(),
            });
        }

        let mut ranges = [None; ANCHOR_COUNT];
        let mut buf = data;
        for slot in &mut ranges {
            if buf.chunk().starts_with(&ABSENT_SENTINEL) {
                buf.advance(SLOT_BYTES);
            } else {
                *slot = Some(buf.get_f32_le());
            }
        }

        Ok(Self { ranges })
    }

    /// Encode the reading back into the wire layout.
    ///
    /// Absent slots are written as [`ABSENT_SENTINEL`].
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RANGING_PAYLOAD_BYTES] {
        use bytes::BufMut;

        let mut out = [0u8; RANGING_PAYLOAD_BYTES];
        let mut buf = &mut out[..];
        for range in &self.ranges {
            match range {
                Some(value) => buf.put_f32_le(*value),
                None => buf.put_slice(&ABSENT_SENTINEL),
            }
        }
        out
    }

    /// Range for one anchor slot, `None` if absent or out of bounds.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<f32> {
        self.ranges.get(slot).copied().flatten()
    }

    /// All slots in anchor order.
    #[must_use]
    pub fn ranges(&self) -> &[Option<f32>; ANCHOR_COUNT] {
        &self.ranges
    }

    /// Number of slots that carry a distance.
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.ranges.iter().filter(|r| r.is_some()).count()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match range {
                Some(value) => write!(f, "{:.3}", value)?,
                None => write!(f, "-")?,
            }
        }
        write!(f, "]")
    }
}

/// Identifiers of the anchors bound to the slots of a [`Reading`].
///
/// Always holds exactly [`ANCHOR_COUNT`] entries.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnchorIds(Vec<String>);

impl AnchorIds {
    /// Synthetic sequential identifiers: `anchor00` through `anchor15`.
    #[must_use]
    pub fn synthetic() -> Self {
        Self((0..ANCHOR_COUNT).map(|i| format!("anchor{:02}", i)).collect())
    }

    /// Bind an explicit identifier list to the reading slots.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::AnchorCountMismatch`] unless the list has exactly
    /// [`ANCHOR_COUNT`] entries.
    pub fn from_list(ids: Vec<String>) -> ParseResult<Self> {
        if ids.len() != ANCHOR_COUNT {
            return Err(ParseError::AnchorCountMismatch {
                expected: ANCHOR_COUNT,
                actual: ids.len(),
            });
        }
        Ok(Self(ids))
    }

    /// Resolve an optional explicit list, falling back to synthetic ids.
    ///
    /// # Errors
    ///
    /// See [`AnchorIds::from_list`].
    pub fn resolve(ids: Option<&[String]>) -> ParseResult<Self> {
        match ids {
            Some(ids) => Self::from_list(ids.to_vec()),
            None => Ok(Self::synthetic()),
        }
    }

    /// Identifier for one slot.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&str> {
        self.0.get(slot).map(String::as_str)
    }

    /// Iterate over identifiers in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for AnchorIds {
    fn default() -> Self {
        Self::synthetic()
    }
}

/// The unit of output: one successful read of one tag.
///
/// Records are immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Record {
    timestamp: OffsetDateTime,
    address: String,
    name: String,
    reading: Reading,
    anchors: AnchorIds,
}

impl Record {
    /// Create a record.
    pub fn new(
        timestamp: OffsetDateTime,
        address: impl Into<String>,
        name: impl Into<String>,
        reading: Reading,
        anchors: AnchorIds,
    ) -> Self {
        Self {
            timestamp,
            address: address.into(),
            name: name.into(),
            reading,
            anchors,
        }
    }

    /// Capture instant (UTC).
    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    /// Radio address of the tag.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Local name of the tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ranging measurement.
    pub fn reading(&self) -> &Reading {
        &self.reading
    }

    /// Anchor identifiers bound to the reading slots.
    pub fn anchors(&self) -> &AnchorIds {
        &self.anchors
    }

    /// Expand into one entry per anchor that reported a distance.
    #[must_use]
    pub fn anchor_ranges(&self) -> Vec<AnchorRange> {
        self.reading
            .ranges()
            .iter()
            .zip(self.anchors.iter())
            .filter_map(|(range, anchor_id)| {
                range.map(|range| AnchorRange {
                    device_name: self.name.clone(),
                    anchor_id: anchor_id.to_string(),
                    range,
                })
            })
            .collect()
    }
}

/// Per-anchor expansion of a [`Record`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnchorRange {
    /// Local name of the tag.
    pub device_name: String,
    /// Anchor the distance was measured to.
    pub anchor_id: String,
    /// Distance to the anchor.
    pub range: f32,
}
