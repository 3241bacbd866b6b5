//! Trait abstraction over the BLE stack.
//!
//! This module provides the [`BleTransport`] trait that abstracts over the
//! real `btleplug` stack ([`crate::btle::BtleTransport`]) and the in-memory
//! transport used in tests ([`crate::mock::MockTransport`]).
//!
//! Handles are transport-defined associated types. A service handle is only
//! meaningful together with the connection it was looked up on, and a
//! characteristic handle together with its service.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use tray_types::Advertisement;

use crate::error::Result;

/// Primitive BLE operations needed to discover and poll ranging tags.
///
/// # Example
///
/// ```ignore
/// use tray_core::{BleTransport, Result};
/// use tray_types::uuid::{RANGING_CHARACTERISTIC, RANGING_SERVICE};
///
/// async fn read_once<T: BleTransport>(transport: &T) -> Result<Vec<u8>> {
///     let adv = transport.scan(Duration::from_secs(5)).await?.remove(0);
///     let conn = transport.connect(&adv).await?;
///     let service = transport.service(&conn, RANGING_SERVICE).await?;
///     let chr = transport.characteristic(&service, RANGING_CHARACTERISTIC).await?;
///     transport.read(&chr).await
/// }
/// ```
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// An open connection to one peripheral.
    type Connection: Send + Sync;
    /// A GATT service resolved on a connection.
    type Service: Send + Sync;
    /// A readable GATT characteristic resolved on a service.
    type Characteristic: Send + Sync;

    /// Scan for `timeout` and return every advertisement observed.
    async fn scan(&self, timeout: Duration) -> Result<Vec<Advertisement>>;

    /// Open a connection to the advertiser.
    async fn connect(&self, advertisement: &Advertisement) -> Result<Self::Connection>;

    /// Look up a service by UUID on an open connection.
    async fn service(&self, connection: &Self::Connection, uuid: Uuid) -> Result<Self::Service>;

    /// Look up a characteristic by UUID within a service.
    async fn characteristic(
        &self,
        service: &Self::Service,
        uuid: Uuid,
    ) -> Result<Self::Characteristic>;

    /// Read the raw value of a characteristic.
    async fn read(&self, characteristic: &Self::Characteristic) -> Result<Vec<u8>>;

    /// Close a connection.
    async fn disconnect(&self, connection: &Self::Connection) -> Result<()>;
}
