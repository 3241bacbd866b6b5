//! A connected ranging tag.
//!
//! [`TagDevice`] owns one tag's radio session and keeps it usable across
//! stale connections. All handles live in one [`Session`] stamped with the
//! connection generation they were derived from, so a characteristic can
//! never be paired with a service from another connection.
//!
//! # Repair
//!
//! Every read first checks the service, then the characteristic, on the
//! held connection. A link that went stale since the last read shows up in
//! that check, and the failing step gets one more chance on a freshly
//! recreated connection. Only then is the raw read made. When it fails the
//! session is discarded, a single reconnect is made, the service and
//! characteristic are resolved again and the read is retried once. Nothing
//! here loops.
//!
//! ```text
//!  Unresolved --connect--> Resolving --ok--> Resolved
//!                              |               |  read: check, then
//!                              v               v  read or reconnect
//!                            Broken <--fail-- Resolving
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use tray_types::uuid::{RANGING_CHARACTERISTIC, RANGING_SERVICE};
use tray_types::{Advertisement, Reading};

use crate::error::{Error, Result};
use crate::retry::{RetryConfig, with_retry};
use crate::transport::BleTransport;

/// Lifecycle state of a [`TagDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagState {
    /// No connection held.
    Unresolved,
    /// Connection, service and characteristic are being (re)established.
    Resolving,
    /// Fully resolved and readable.
    Resolved,
    /// Resolution or repair failed; the tag should be closed and dropped.
    Broken,
}

/// Handles derived from one connection.
struct Session<T: BleTransport> {
    generation: u64,
    connection: T::Connection,
    service: T::Service,
    characteristic: T::Characteristic,
}

/// One ranging tag and its radio session.
///
/// # Cleanup
///
/// Call [`TagDevice::close`] before dropping the tag. A tag dropped while
/// still connected logs a warning; the connection is left to the transport.
pub struct TagDevice<T: BleTransport> {
    transport: Arc<T>,
    advertisement: Advertisement,
    name: String,
    state: TagState,
    generation: u64,
    session: Option<Session<T>>,
}

impl<T: BleTransport> std::fmt::Debug for TagDevice<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagDevice")
            .field("address", &self.advertisement.address)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<T: BleTransport> TagDevice<T> {
    /// Connect to the tag behind `advertisement` and resolve its ranging
    /// characteristic.
    ///
    /// The connection itself is retried according to `retry`. Service and
    /// characteristic lookups are not: if either fails the connection is
    /// closed and the error returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NameUnavailable`] if the advertisement has no
    /// complete local name, otherwise the connect or lookup error.
    #[tracing::instrument(level = "debug", skip_all, fields(address = %advertisement.address))]
    pub async fn connect(
        transport: Arc<T>,
        advertisement: Advertisement,
        retry: &RetryConfig,
    ) -> Result<Self> {
        let name = advertisement
            .local_name()
            .ok_or_else(|| Error::NameUnavailable {
                address: advertisement.address.clone(),
            })?
            .to_string();

        let mut device = Self {
            transport,
            advertisement,
            name,
            state: TagState::Unresolved,
            generation: 0,
            session: None,
        };

        device.state = TagState::Resolving;
        let connection = {
            let transport: &T = &device.transport;
            let advertisement = &device.advertisement;
            with_retry(retry, "connect", || transport.connect(advertisement)).await
        };
        let connection = match connection {
            Ok(connection) => connection,
            Err(e) => {
                device.state = TagState::Broken;
                return Err(e);
            }
        };
        device.generation += 1;

        match device.lookup(&connection).await {
            Ok((service, characteristic)) => {
                device.install(connection, service, characteristic);
                info!(
                    address = %device.address(),
                    name = %device.name,
                    "Connected to tag"
                );
                Ok(device)
            }
            Err(e) => {
                device.release(&connection).await;
                device.state = TagState::Broken;
                Err(e)
            }
        }
    }

    /// Radio address of the tag.
    pub fn address(&self) -> &str {
        &self.advertisement.address
    }

    /// Local name from the advertisement.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TagState {
        self.state
    }

    /// Generation of the current connection.
    ///
    /// Starts at 1 after construction and grows by one with every new
    /// connection.
    pub fn generation(&self) -> u64 {
        self.session
            .as_ref()
            .map_or(self.generation, |session| session.generation)
    }

    /// Whether the tag holds a full session.
    pub fn is_resolved(&self) -> bool {
        self.state == TagState::Resolved && self.session.is_some()
    }

    /// Read and decode one ranging payload.
    ///
    /// The held service and characteristic are checked first, each through
    /// its own repair path. A failed raw read then triggers one repair
    /// (reconnect, re-resolve, read again). A payload of the wrong size is
    /// not retried.
    ///
    /// # Errors
    ///
    /// [`Error::ReadFailed`] if a check or the repair fails, leaving the tag
    /// [`TagState::Broken`]; [`Error::MalformedPayload`] for a payload that
    /// is not exactly 64 bytes.
    pub async fn read(&mut self) -> Result<Reading> {
        if let Some(session) = self.session.take()
            && let Err(e) = self.check_session(session).await
        {
            self.state = TagState::Broken;
            return Err(Error::read_failed(self.address(), e));
        }

        let raw = match self.read_raw().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    address = %self.address(),
                    error = %e,
                    "Read failed, reconnecting"
                );
                match self.repair_and_read().await {
                    Ok(raw) => raw,
                    Err(e) => {
                        self.state = TagState::Broken;
                        return Err(Error::read_failed(self.address(), e));
                    }
                }
            }
        };

        Ok(Reading::from_bytes(&raw)?)
    }

    /// Release the connection.
    ///
    /// Disconnect errors are discarded: the link is often already gone when
    /// a tag is closed.
    pub async fn close(&mut self) {
        self.discard_session().await;
        self.state = TagState::Unresolved;
    }

    /// Re-check the service and then the characteristic of a held session.
    ///
    /// The cached service is kept while its connection survives the check.
    async fn check_session(&mut self, session: Session<T>) -> Result<()> {
        self.state = TagState::Resolving;
        let Session {
            connection,
            service,
            ..
        } = session;

        let (connection, service) = self.service_with_repair(connection, Some(service)).await?;
        let (connection, service, characteristic) =
            self.characteristic_with_repair(connection, service).await?;
        self.install(connection, service, characteristic);
        Ok(())
    }

    async fn read_raw(&self) -> Result<Vec<u8>> {
        let session = self.session.as_ref().ok_or(Error::NotConnected)?;
        self.transport.read(&session.characteristic).await
    }

    async fn repair_and_read(&mut self) -> Result<Vec<u8>> {
        self.state = TagState::Resolving;
        self.discard_session().await;

        let connection = self.transport.connect(&self.advertisement).await?;
        self.generation += 1;

        let (connection, service) = self.service_with_repair(connection, None).await?;
        let (connection, service, characteristic) =
            self.characteristic_with_repair(connection, service).await?;
        self.install(connection, service, characteristic);

        let raw = self.read_raw().await?;
        debug!(
            address = %self.address(),
            generation = self.generation,
            "Read succeeded after reconnect"
        );
        Ok(raw)
    }

    /// Look up the service, recreating the connection once if it is missing.
    ///
    /// A `cached` handle is returned in place of the fresh one when the
    /// lookup succeeds on the same connection.
    async fn service_with_repair(
        &mut self,
        connection: T::Connection,
        cached: Option<T::Service>,
    ) -> Result<(T::Connection, T::Service)> {
        match self.transport.service(&connection, RANGING_SERVICE).await {
            Ok(service) => Ok((connection, cached.unwrap_or(service))),
            Err(e) => {
                warn!(
                    address = %self.address(),
                    error = %e,
                    "Service lookup failed, recreating connection"
                );
                drop(cached);
                let connection = self.recreate(connection).await?;
                match self.transport.service(&connection, RANGING_SERVICE).await {
                    Ok(service) => Ok((connection, service)),
                    Err(e) => {
                        self.release(&connection).await;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Look up the characteristic, recreating the connection and service once
    /// if it is missing.
    async fn characteristic_with_repair(
        &mut self,
        connection: T::Connection,
        service: T::Service,
    ) -> Result<(T::Connection, T::Service, T::Characteristic)> {
        match self
            .transport
            .characteristic(&service, RANGING_CHARACTERISTIC)
            .await
        {
            Ok(characteristic) => Ok((connection, service, characteristic)),
            Err(e) => {
                warn!(
                    address = %self.address(),
                    error = %e,
                    "Characteristic lookup failed, recreating connection"
                );
                drop(service);
                let connection = self.recreate(connection).await?;
                match self.lookup(&connection).await {
                    Ok((service, characteristic)) => Ok((connection, service, characteristic)),
                    Err(e) => {
                        self.release(&connection).await;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Plain service then characteristic lookup on one connection.
    async fn lookup(&self, connection: &T::Connection) -> Result<(T::Service, T::Characteristic)> {
        let service = self.transport.service(connection, RANGING_SERVICE).await?;
        let characteristic = self
            .transport
            .characteristic(&service, RANGING_CHARACTERISTIC)
            .await?;
        Ok((service, characteristic))
    }

    async fn recreate(&mut self, connection: T::Connection) -> Result<T::Connection> {
        self.release(&connection).await;
        let connection = self.transport.connect(&self.advertisement).await?;
        self.generation += 1;
        Ok(connection)
    }

    fn install(
        &mut self,
        connection: T::Connection,
        service: T::Service,
        characteristic: T::Characteristic,
    ) {
        self.session = Some(Session {
            generation: self.generation,
            connection,
            service,
            characteristic,
        });
        self.state = TagState::Resolved;
    }

    async fn discard_session(&mut self) {
        if let Some(session) = self.session.take() {
            self.release(&session.connection).await;
        }
    }

    async fn release(&self, connection: &T::Connection) {
        if let Err(e) = self.transport.disconnect(connection).await {
            debug!(
                address = %self.address(),
                error = %e,
                "Ignoring disconnect error"
            );
        }
    }
}

impl<T: BleTransport> Drop for TagDevice<T> {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                address = %self.advertisement.address,
                name = %self.name,
                "Tag dropped without calling close()"
            );
        }
    }
}
