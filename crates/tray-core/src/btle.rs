//! [`BleTransport`] implementation backed by `btleplug`.
//!
//! `btleplug` does not expose raw advertising data, so advertisements are
//! rebuilt from peripheral properties: one `0x03` field per advertised service
//! UUID, a `0x09` field for the local name and one `0xFF` field per
//! manufacturer data entry.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter,
    Service,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};
use uuid::Uuid;

use tray_types::Advertisement;
use tray_types::uuid::{
    COMPLETE_16B_SERVICES_TYPE_CODE, COMPLETE_LOCAL_NAME_TYPE_CODE,
    MANUFACTURER_SPECIFIC_TYPE_CODE,
};

use crate::error::{Error, Result};
use crate::transport::BleTransport;
use crate::util::create_identifier;

/// Default timeout for BLE characteristic read operations.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-operation timeouts for the `btleplug` transport.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tray_core::btle::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .connection_timeout(Duration::from_secs(20))
///     .read_timeout(Duration::from_secs(15));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
    /// Timeout for BLE read operations.
    pub read_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}

/// A service resolved on a connected peripheral.
#[derive(Debug, Clone)]
pub struct BtleService {
    peripheral: Peripheral,
    service: Service,
}

/// A characteristic resolved within a [`BtleService`].
#[derive(Debug, Clone)]
pub struct BtleCharacteristic {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

/// BLE transport over the first available system adapter.
pub struct BtleTransport {
    adapter: Adapter,
    config: ConnectionConfig,
    /// Peripherals seen by the most recent scan, keyed by identifier.
    peripherals: RwLock<HashMap<String, Peripheral>>,
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|e| Error::AdapterUnavailable(e.to_string()))?;
    let adapters = manager
        .adapters()
        .await
        .map_err(|e| Error::AdapterUnavailable(e.to_string()))?;

    adapters
        .into_iter()
        .next()
        .ok_or_else(|| Error::AdapterUnavailable("no Bluetooth adapter found".to_string()))
}

impl BtleTransport {
    /// Open the first available adapter with default timeouts.
    pub async fn new() -> Result<Self> {
        Self::with_config(ConnectionConfig::default()).await
    }

    /// Open the first available adapter with custom timeouts.
    pub async fn with_config(config: ConnectionConfig) -> Result<Self> {
        let adapter = get_adapter().await?;
        Ok(Self {
            adapter,
            config,
            peripherals: RwLock::new(HashMap::new()),
        })
    }

    /// The timeouts in use.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn peripheral_for(&self, address: &str) -> Result<Peripheral> {
        if let Some(peripheral) = self.peripherals.read().await.get(address) {
            return Ok(peripheral.clone());
        }

        // Not seen by our last scan; the adapter may still know it.
        for peripheral in self.adapter.peripherals().await? {
            if let Some(properties) = peripheral.properties().await? {
                let identifier = create_identifier(&properties.address.to_string(), &peripheral.id());
                if identifier == address {
                    return Ok(peripheral);
                }
            }
        }

        Err(Error::connection_failed(address, "peripheral not known to adapter"))
    }
}

/// Rebuild an advertisement from peripheral properties.
pub fn advertisement_from_properties(
    identifier: String,
    properties: &PeripheralProperties,
) -> Advertisement {
    let mut adv = Advertisement::new(identifier);
    adv.rssi = properties.rssi;

    for service in &properties.services {
        adv = adv.with_field(COMPLETE_16B_SERVICES_TYPE_CODE, service.to_string());
    }
    if let Some(name) = &properties.local_name {
        adv = adv.with_field(COMPLETE_LOCAL_NAME_TYPE_CODE, name.clone());
    }

    let mut manufacturers: Vec<_> = properties.manufacturer_data.iter().collect();
    manufacturers.sort_by_key(|(id, _)| **id);
    for (id, data) in manufacturers {
        let mut value = format!("{:04x}", id);
        for byte in data {
            let _ = write!(value, "{:02x}", byte);
        }
        adv = adv.with_field(MANUFACTURER_SPECIFIC_TYPE_CODE, value);
    }

    adv
}

#[async_trait]
impl BleTransport for BtleTransport {
    type Connection = Peripheral;
    type Service = BtleService;
    type Characteristic = BtleCharacteristic;

    async fn scan(&self, duration: Duration) -> Result<Vec<Advertisement>> {
        info!("Starting BLE scan for {} seconds...", duration.as_secs());

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| Error::AdapterUnavailable(e.to_string()))?;
        sleep(duration).await;
        self.adapter.stop_scan().await?;

        let mut seen = HashMap::new();
        let mut advertisements = Vec::new();
        for peripheral in self.adapter.peripherals().await? {
            let properties = match peripheral.properties().await {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Error reading peripheral properties: {}", e);
                    continue;
                }
            };

            let identifier = create_identifier(&properties.address.to_string(), &peripheral.id());
            advertisements.push(advertisement_from_properties(identifier.clone(), &properties));
            seen.insert(identifier, peripheral);
        }

        debug!("Scan saw {} peripheral(s)", advertisements.len());
        *self.peripherals.write().await = seen;
        Ok(advertisements)
    }

    async fn connect(&self, advertisement: &Advertisement) -> Result<Peripheral> {
        let peripheral = self.peripheral_for(&advertisement.address).await?;

        debug!(address = %advertisement.address, "Connecting to device...");
        timeout(self.config.connection_timeout, peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect to device", self.config.connection_timeout))??;

        timeout(self.config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", self.config.discovery_timeout))??;

        Ok(peripheral)
    }

    async fn service(&self, connection: &Peripheral, uuid: Uuid) -> Result<BtleService> {
        if !connection.is_connected().await? {
            return Err(Error::NotConnected);
        }

        connection
            .services()
            .into_iter()
            .find(|s| s.uuid == uuid)
            .map(|service| BtleService {
                peripheral: connection.clone(),
                service,
            })
            .ok_or_else(|| Error::service_not_found(uuid))
    }

    async fn characteristic(&self, service: &BtleService, uuid: Uuid) -> Result<BtleCharacteristic> {
        service
            .service
            .characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .map(|characteristic| BtleCharacteristic {
                peripheral: service.peripheral.clone(),
                characteristic: characteristic.clone(),
            })
            .ok_or_else(|| Error::characteristic_not_found(uuid))
    }

    async fn read(&self, characteristic: &BtleCharacteristic) -> Result<Vec<u8>> {
        let data = timeout(
            self.config.read_timeout,
            characteristic.peripheral.read(&characteristic.characteristic),
        )
        .await
        .map_err(|_| Error::timeout("read characteristic", self.config.read_timeout))??;
        Ok(data)
    }

    async fn disconnect(&self, connection: &Peripheral) -> Result<()> {
        connection.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tray_types::uuid::ADVERTISED_SERVICE;

    #[test]
    fn test_advertisement_from_properties() {
        let properties = PeripheralProperties {
            local_name: Some("tag-01".to_string()),
            rssi: Some(-61),
            services: vec![ADVERTISED_SERVICE],
            manufacturer_data: HashMap::from([(0x0059, vec![0x01, 0xAB])]),
            ..Default::default()
        };

        let adv = advertisement_from_properties("AA:AA:AA:AA:AA:01".to_string(), &properties);

        assert_eq!(adv.address, "AA:AA:AA:AA:AA:01");
        assert_eq!(adv.rssi, Some(-61));
        assert_eq!(adv.local_name(), Some("tag-01"));
        assert_eq!(
            adv.values(COMPLETE_16B_SERVICES_TYPE_CODE).collect::<Vec<_>>(),
            vec!["00001811-0000-1000-8000-00805f9b34fb"]
        );
        assert_eq!(
            adv.values(MANUFACTURER_SPECIFIC_TYPE_CODE).collect::<Vec<_>>(),
            vec!["005901ab"]
        );
    }

    #[test]
    fn test_connection_config_builder() {
        let config = ConnectionConfig::default()
            .connection_timeout(Duration::from_secs(20))
            .read_timeout(Duration::from_secs(3));

        assert_eq!(config.connection_timeout, Duration::from_secs(20));
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert_eq!(config.discovery_timeout, DEFAULT_DISCOVERY_TIMEOUT);
    }
}
