//! Bluetooth identifiers and advertisement codes for tray sensor tags.
//!
//! This module contains the UUIDs and advertising-data type codes needed to
//! discover and read tray sensor ranging tags over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

// --- Ranging Service ---

/// Custom GATT service exposed by every ranging tag.
pub const RANGING_SERVICE: Uuid = uuid!("59462f12-9543-9999-12c8-58b459a2712d");

/// Characteristic carrying the 64-byte ranging payload.
pub const RANGING_CHARACTERISTIC: Uuid = uuid!("5c3a659e-897e-45e1-b016-007107c96df7");

// --- Advertisement ---

/// 16-bit service UUID that tags list in their advertisements, in its
/// expanded 128-bit form.
pub const ADVERTISED_SERVICE: Uuid = uuid!("00001811-0000-1000-8000-00805f9b34fb");

/// AD type: complete list of 16-bit service class UUIDs.
pub const COMPLETE_16B_SERVICES_TYPE_CODE: u8 = 0x03;

/// AD type: complete local name.
pub const COMPLETE_LOCAL_NAME_TYPE_CODE: u8 = 0x09;

/// AD type: manufacturer specific data.
pub const MANUFACTURER_SPECIFIC_TYPE_CODE: u8 = 0xFF;

/// Human-readable description for an AD type code, as reported by scanners.
#[must_use]
pub fn ad_type_description(type_code: u8) -> &'static str {
    match type_code {
        0x01 => "Flags",
        0x02 => "Incomplete 16b Services",
        COMPLETE_16B_SERVICES_TYPE_CODE => "Complete 16b Services",
        0x08 => "Short Local Name",
        COMPLETE_LOCAL_NAME_TYPE_CODE => "Complete Local Name",
        0x0A => "Tx Power",
        0x16 => "16b Service Data",
        MANUFACTURER_SPECIFIC_TYPE_CODE => "Manufacturer",
        _ => "Unknown",
    }
}
