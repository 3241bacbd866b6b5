//! Mock transport implementation for testing.
//!
//! This module provides an in-memory [`BleTransport`] that can be used to
//! exercise discovery, repair and collection without BLE hardware.
//!
//! # Features
//!
//! - **Failure injection**: fail the next N connects, service lookups,
//!   characteristic lookups or reads of a tag
//! - **Stale connections**: drop a tag's link without telling the holder
//! - **Range simulation**: take a tag out of range so it stops advertising
//! - **Counters**: scans, connects, disconnects and reads per tag

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use tray_types::uuid::{
    ADVERTISED_SERVICE, COMPLETE_16B_SERVICES_TYPE_CODE, COMPLETE_LOCAL_NAME_TYPE_CODE,
    RANGING_CHARACTERISTIC, RANGING_SERVICE,
};
use tray_types::{ANCHOR_COUNT, Advertisement, Reading};

use crate::error::{Error, Result};
use crate::transport::BleTransport;

/// Handle to an open mock connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConnection {
    address: String,
    id: u64,
}

impl MockConnection {
    /// Connection id, unique for the lifetime of the transport.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Handle to a mock service, bound to the connection it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockService {
    address: String,
    connection: u64,
}

/// Handle to a mock characteristic, bound to the connection it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCharacteristic {
    address: String,
    connection: u64,
}

impl MockCharacteristic {
    /// Id of the connection this handle was derived from.
    pub fn connection_id(&self) -> u64 {
        self.connection
    }
}

#[derive(Debug)]
struct MockTag {
    payload: Vec<u8>,
    in_range: bool,
    has_service: bool,
    has_characteristic: bool,
    live_connection: Option<u64>,
    connect_failures: u32,
    service_failures: u32,
    characteristic_failures: u32,
    read_failures: u32,
    fail_disconnect: bool,
    connects: u32,
    disconnects: u32,
    reads: u32,
}

impl MockTag {
    fn new() -> Self {
        Self {
            payload: MockTransport::default_reading().to_bytes().to_vec(),
            in_range: true,
            has_service: true,
            has_characteristic: true,
            live_connection: None,
            connect_failures: 0,
            service_failures: 0,
            characteristic_failures: 0,
            read_failures: 0,
            fail_disconnect: false,
            connects: 0,
            disconnects: 0,
            reads: 0,
        }
    }

    fn check_link(&self, connection: u64) -> Result<()> {
        if self.in_range && self.live_connection == Some(connection) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    adapter_available: bool,
    advertisements: Vec<Advertisement>,
    tags: HashMap<String, MockTag>,
    next_connection: u64,
    scans: u32,
    last_scan_timeout: Option<Duration>,
}

/// An in-memory BLE transport for testing.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tray_core::{BleTransport, MockTransport};
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::new();
///     transport.add_tag("AA:AA:AA:AA:AA:01", "tag-01");
///
///     let found = transport.scan(Duration::from_secs(1)).await.unwrap();
///     assert_eq!(found.len(), 1);
/// }
/// ```
#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create an empty transport with a working adapter.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                adapter_available: true,
                ..Default::default()
            }),
        }
    }

    /// Reading served by tags that were not given an explicit payload.
    ///
    /// Slot `i` holds `i + 0.5`.
    pub fn default_reading() -> Reading {
        let mut ranges = [None; ANCHOR_COUNT];
        for (i, range) in ranges.iter_mut().enumerate() {
            *range = Some(i as f32 + 0.5);
        }
        Reading::new(ranges)
    }

    /// Advertisement a ranging tag would send.
    pub fn tag_advertisement(address: &str, name: &str) -> Advertisement {
        Advertisement::new(address)
            .with_rssi(-60)
            .with_field(0x01, "06")
            .with_field(COMPLETE_16B_SERVICES_TYPE_CODE, ADVERTISED_SERVICE.to_string())
            .with_field(COMPLETE_LOCAL_NAME_TYPE_CODE, name)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_tag<R>(&self, address: &str, f: impl FnOnce(&mut MockTag) -> R) -> Option<R> {
        self.state().tags.get_mut(address).map(f)
    }

    // --- Test control methods ---

    /// Add a ranging tag that advertises the tag service and a local name.
    pub fn add_tag(&self, address: &str, name: &str) -> Advertisement {
        let advertisement = Self::tag_advertisement(address, name);
        self.add_advertisement(advertisement.clone());
        advertisement
    }

    /// Add an arbitrary advertisement to every subsequent scan.
    ///
    /// The advertiser becomes connectable; it exposes the ranging service
    /// whether or not the advertisement says so.
    pub fn add_advertisement(&self, advertisement: Advertisement) {
        let mut state = self.state();
        state
            .tags
            .entry(advertisement.address.clone())
            .or_insert_with(MockTag::new);
        state.advertisements.push(advertisement);
    }

    /// Make the adapter available or unavailable.
    pub fn set_adapter_available(&self, available: bool) {
        self.state().adapter_available = available;
    }

    /// Move a tag in or out of range.
    ///
    /// Out of range tags do not advertise, refuse connections and lose any
    /// open connection.
    pub fn set_in_range(&self, address: &str, in_range: bool) {
        self.with_tag(address, |tag| {
            tag.in_range = in_range;
            if !in_range {
                tag.live_connection = None;
            }
        });
    }

    /// Set the raw payload a tag returns.
    pub fn set_payload(&self, address: &str, payload: Vec<u8>) {
        self.with_tag(address, |tag| tag.payload = payload);
    }

    /// Set the reading a tag returns.
    pub fn set_reading(&self, address: &str, reading: Reading) {
        self.set_payload(address, reading.to_bytes().to_vec());
    }

    /// Drop the tag's current connection without notifying the holder.
    pub fn make_stale(&self, address: &str) {
        self.with_tag(address, |tag| tag.live_connection = None);
    }

    /// Fail the next `count` connection attempts.
    pub fn fail_connects(&self, address: &str, count: u32) {
        self.with_tag(address, |tag| tag.connect_failures = count);
    }

    /// Fail the next `count` service lookups.
    pub fn fail_service_lookups(&self, address: &str, count: u32) {
        self.with_tag(address, |tag| tag.service_failures = count);
    }

    /// Fail the next `count` characteristic lookups.
    pub fn fail_characteristic_lookups(&self, address: &str, count: u32) {
        self.with_tag(address, |tag| tag.characteristic_failures = count);
    }

    /// Fail the next `count` reads.
    pub fn fail_reads(&self, address: &str, count: u32) {
        self.with_tag(address, |tag| tag.read_failures = count);
    }

    /// Remove the ranging service from a tag.
    pub fn remove_service(&self, address: &str) {
        self.with_tag(address, |tag| tag.has_service = false);
    }

    /// Remove the ranging characteristic from a tag.
    pub fn remove_characteristic(&self, address: &str) {
        self.with_tag(address, |tag| tag.has_characteristic = false);
    }

    /// Make disconnects of a tag report an error (after disconnecting).
    pub fn fail_disconnects(&self, address: &str, fail: bool) {
        self.with_tag(address, |tag| tag.fail_disconnect = fail);
    }

    // --- Counters ---

    /// Number of scans performed.
    pub fn scan_count(&self) -> u32 {
        self.state().scans
    }

    /// Timeout passed to the most recent scan.
    pub fn last_scan_timeout(&self) -> Option<Duration> {
        self.state().last_scan_timeout
    }

    /// Number of successful connects to a tag.
    pub fn connect_count(&self, address: &str) -> u32 {
        self.with_tag(address, |tag| tag.connects).unwrap_or(0)
    }

    /// Number of disconnect calls for a tag.
    pub fn disconnect_count(&self, address: &str) -> u32 {
        self.with_tag(address, |tag| tag.disconnects).unwrap_or(0)
    }

    /// Number of successful reads from a tag.
    pub fn read_count(&self, address: &str) -> u32 {
        self.with_tag(address, |tag| tag.reads).unwrap_or(0)
    }

    /// Whether a tag currently has an open connection.
    pub fn is_connected(&self, address: &str) -> bool {
        self.with_tag(address, |tag| tag.live_connection.is_some())
            .unwrap_or(false)
    }

    /// Number of tags with an open connection.
    pub fn open_connections(&self) -> usize {
        self.state()
            .tags
            .values()
            .filter(|tag| tag.live_connection.is_some())
            .count()
    }

    fn check_adapter(state: &MockState) -> Result<()> {
        if state.adapter_available {
            Ok(())
        } else {
            Err(Error::AdapterUnavailable(
                "mock adapter powered off".to_string(),
            ))
        }
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    type Connection = MockConnection;
    type Service = MockService;
    type Characteristic = MockCharacteristic;

    async fn scan(&self, timeout: Duration) -> Result<Vec<Advertisement>> {
        let mut state = self.state();
        Self::check_adapter(&state)?;
        state.scans += 1;
        state.last_scan_timeout = Some(timeout);

        let state = &*state;
        Ok(state
            .advertisements
            .iter()
            .filter(|adv| state.tags.get(&adv.address).is_some_and(|t| t.in_range))
            .cloned()
            .collect())
    }

    async fn connect(&self, advertisement: &Advertisement) -> Result<MockConnection> {
        let mut state = self.state();
        Self::check_adapter(&state)?;
        state.next_connection += 1;
        let id = state.next_connection;

        let address = &advertisement.address;
        let tag = state
            .tags
            .get_mut(address)
            .ok_or_else(|| Error::connection_failed(address.as_str(), "unknown device"))?;

        if !tag.in_range {
            return Err(Error::connection_failed(address.as_str(), "out of range"));
        }
        if tag.connect_failures > 0 {
            tag.connect_failures -= 1;
            return Err(Error::connection_failed(address.as_str(), "injected failure"));
        }

        tag.connects += 1;
        tag.live_connection = Some(id);
        Ok(MockConnection {
            address: address.clone(),
            id,
        })
    }

    async fn service(&self, connection: &MockConnection, uuid: Uuid) -> Result<MockService> {
        let mut state = self.state();
        let tag = state
            .tags
            .get_mut(&connection.address)
            .ok_or(Error::NotConnected)?;
        tag.check_link(connection.id)?;

        if tag.service_failures > 0 {
            tag.service_failures -= 1;
            return Err(Error::service_not_found(uuid));
        }
        if uuid != RANGING_SERVICE || !tag.has_service {
            return Err(Error::service_not_found(uuid));
        }

        Ok(MockService {
            address: connection.address.clone(),
            connection: connection.id,
        })
    }

    async fn characteristic(
        &self,
        service: &MockService,
        uuid: Uuid,
    ) -> Result<MockCharacteristic> {
        let mut state = self.state();
        let tag = state
            .tags
            .get_mut(&service.address)
            .ok_or(Error::NotConnected)?;
        tag.check_link(service.connection)?;

        if tag.characteristic_failures > 0 {
            tag.characteristic_failures -= 1;
            return Err(Error::characteristic_not_found(uuid));
        }
        if uuid != RANGING_CHARACTERISTIC || !tag.has_characteristic {
            return Err(Error::characteristic_not_found(uuid));
        }

        Ok(MockCharacteristic {
            address: service.address.clone(),
            connection: service.connection,
        })
    }

    async fn read(&self, characteristic: &MockCharacteristic) -> Result<Vec<u8>> {
        let mut state = self.state();
        let tag = state
            .tags
            .get_mut(&characteristic.address)
            .ok_or(Error::NotConnected)?;
        tag.check_link(characteristic.connection)?;

        if tag.read_failures > 0 {
            tag.read_failures -= 1;
            return Err(Error::timeout("read characteristic", Duration::from_secs(10)));
        }

        tag.reads += 1;
        Ok(tag.payload.clone())
    }

    async fn disconnect(&self, connection: &MockConnection) -> Result<()> {
        let mut state = self.state();
        let tag = state
            .tags
            .get_mut(&connection.address)
            .ok_or(Error::NotConnected)?;

        tag.disconnects += 1;
        if tag.live_connection == Some(connection.id) {
            tag.live_connection = None;
        } else {
            return Err(Error::NotConnected);
        }

        if tag.fail_disconnect {
            return Err(Error::connection_failed(
                connection.address.as_str(),
                "injected disconnect failure",
            ));
        }
        Ok(())
    }
}
