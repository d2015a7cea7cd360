//! Platform transport seam and its btleplug implementation

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tutorlink_core::{CharacteristicHandle, TransportCommand, TransportEvent, WriteMode};

use crate::config::BleTransportConfig;
use crate::connection::BleConnection;
use crate::discovery::BleDiscovery;
use crate::error::Result;

// ----------------------------------------------------------------------------
// Link-Stamped Events
// ----------------------------------------------------------------------------

/// Sequence number of a connection attempt, assigned by the driver
pub type LinkEpoch = u64;

/// A transport event and the connection attempt it belongs to.
///
/// Adapter-wide events such as scan results carry no epoch. Everything
/// produced on behalf of a link carries the epoch it was issued under, so
/// outcomes of an abandoned attempt can be told apart from the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub link: Option<LinkEpoch>,
    pub event: TransportEvent,
}

impl LinkEvent {
    pub fn adapter(event: TransportEvent) -> Self {
        Self { link: None, event }
    }

    pub fn link(epoch: LinkEpoch, event: TransportEvent) -> Self {
        Self {
            link: Some(epoch),
            event,
        }
    }
}

/// Sending half of the channel a transport reports on
pub type EventSender = mpsc::UnboundedSender<LinkEvent>;

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Platform BLE operations the session driver issues.
///
/// Each method only starts the operation. An `Err` means the request could
/// not be issued at all; otherwise the outcome arrives later as a
/// [`LinkEvent`] on the channel the transport was built with. Link operations
/// stamp their events with the epoch passed to the latest `connect`.
#[async_trait]
pub trait GattTransport: Send {
    async fn start_scan(&mut self) -> Result<()>;

    async fn stop_scan(&mut self) -> Result<()>;

    async fn connect(&mut self, address: &str, link: LinkEpoch) -> Result<()>;

    async fn discover_services(&mut self) -> Result<()>;

    /// Enable notifications on the characteristic and write its descriptor
    async fn subscribe(&mut self, handle: &CharacteristicHandle) -> Result<()>;

    async fn write(
        &mut self,
        handle: &CharacteristicHandle,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<()>;

    /// Close the link, cancel its pending operations and drop every handle
    /// tied to it
    async fn release(&mut self) -> Result<()>;

    /// Dispatch one session command to the matching operation. `link` is the
    /// epoch a `Connect` opens.
    async fn execute(&mut self, command: &TransportCommand, link: LinkEpoch) -> Result<()> {
        match command {
            TransportCommand::StartScan => self.start_scan().await,
            TransportCommand::StopScan => self.stop_scan().await,
            TransportCommand::Connect { address } => self.connect(address, link).await,
            TransportCommand::DiscoverServices => self.discover_services().await,
            TransportCommand::Subscribe { handle } => self.subscribe(handle).await,
            TransportCommand::WriteCharacteristic {
                handle,
                value,
                mode,
            } => self.write(handle, value, *mode).await,
            TransportCommand::Release => self.release().await,
        }
    }
}

// ----------------------------------------------------------------------------
// btleplug Transport
// ----------------------------------------------------------------------------

/// [`GattTransport`] backed by the host's Bluetooth adapter
pub struct BtleplugTransport {
    discovery: BleDiscovery,
    connection: BleConnection,
    event_pump: JoinHandle<()>,
}

impl BtleplugTransport {
    /// Open the configured adapter and start forwarding its events to `events`
    pub async fn new(
        config: BleTransportConfig,
        events: EventSender,
    ) -> Result<Self> {
        let discovery = BleDiscovery::initialize(&config).await?;
        let connection = BleConnection::new(config, events.clone());
        let event_pump = discovery
            .spawn_event_pump(events, connection.link())
            .await?;

        Ok(Self {
            discovery,
            connection,
            event_pump,
        })
    }
}

#[async_trait]
impl GattTransport for BtleplugTransport {
    async fn start_scan(&mut self) -> Result<()> {
        self.discovery.start_scanning().await
    }

    async fn stop_scan(&mut self) -> Result<()> {
        self.discovery.stop_scanning().await
    }

    async fn connect(&mut self, address: &str, link: LinkEpoch) -> Result<()> {
        let peripheral = self.discovery.find_peripheral(address).await?;
        self.connection.connect(peripheral, link).await;
        Ok(())
    }

    async fn discover_services(&mut self) -> Result<()> {
        self.connection.discover_services().await
    }

    async fn subscribe(&mut self, handle: &CharacteristicHandle) -> Result<()> {
        self.connection.subscribe(handle).await
    }

    async fn write(
        &mut self,
        handle: &CharacteristicHandle,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        self.connection.write(handle, value, mode).await
    }

    async fn release(&mut self) -> Result<()> {
        self.connection.release().await
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        self.event_pump.abort();
        info!("BLE transport stopped");
    }
}
