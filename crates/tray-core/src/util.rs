//! Utility functions for tray-core.

use btleplug::platform::PeripheralId;

/// Address reported by platforms that hide the MAC address (macOS).
pub const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Whether the platform withheld the real radio address.
pub fn is_hidden_address(address: &str) -> bool {
    address == HIDDEN_ADDRESS
}

/// Create the registry key for a peripheral.
///
/// Uses the Bluetooth address, or the peripheral ID where the address is
/// hidden.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if is_hidden_address(address) {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_address() {
        assert!(is_hidden_address("00:00:00:00:00:00"));
        assert!(!is_hidden_address("AA:AA:AA:AA:AA:01"));
    }
}
