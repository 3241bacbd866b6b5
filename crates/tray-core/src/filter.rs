//! Tag discovery from radio advertisements.
//!
//! A ranging tag lists the `0x1811` service in the complete 16-bit service
//! list of its advertisement. Everything else in range is ignored.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info};

use tray_types::Advertisement;
use tray_types::uuid::{ADVERTISED_SERVICE, COMPLETE_16B_SERVICES_TYPE_CODE};

use crate::error::Result;
use crate::transport::BleTransport;

/// Whether an advertisement comes from a ranging tag.
///
/// The service value is compared case-insensitively.
///
/// # Example
///
/// ```
/// use tray_core::filter::is_tag_advertisement;
/// use tray_types::Advertisement;
///
/// let adv = Advertisement::new("AA:AA:AA:AA:AA:01")
///     .with_field(0x03, "00001811-0000-1000-8000-00805F9B34FB");
/// assert!(is_tag_advertisement(&adv));
/// ```
pub fn is_tag_advertisement(advertisement: &Advertisement) -> bool {
    let expected = ADVERTISED_SERVICE.to_string();
    advertisement
        .values(COMPLETE_16B_SERVICES_TYPE_CODE)
        .any(|value| value.eq_ignore_ascii_case(&expected))
}

/// Scan for `scan_timeout` and return the advertisements of every tag seen.
///
/// An address is reported at most once per scan. Adapter failures are
/// returned unchanged.
pub async fn find_tags<T: BleTransport>(
    transport: &T,
    scan_timeout: Duration,
) -> Result<Vec<Advertisement>> {
    let advertisements = transport.scan(scan_timeout).await?;

    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for advertisement in advertisements {
        if !is_tag_advertisement(&advertisement) || !seen.insert(advertisement.address.clone()) {
            continue;
        }
        debug!(
            address = %advertisement.address,
            name = ?advertisement.local_name(),
            rssi = ?advertisement.rssi,
            "Found tag candidate"
        );
        tags.push(advertisement);
    }

    info!("Scan complete. Found {} tag(s)", tags.len());
    Ok(tags)
}
