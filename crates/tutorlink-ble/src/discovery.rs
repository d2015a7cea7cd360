//! Adapter setup, scanning and the adapter event pump

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use btleplug::api::{
    BDAddr, Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tutorlink_core::{GattStatus, LinkState, TransportEvent};

use crate::config::BleTransportConfig;
use crate::connection::ActiveLink;
use crate::error::{BleTransportError, Result};
use crate::transport::{EventSender, LinkEvent};

// ----------------------------------------------------------------------------
// Discovery Implementation
// ----------------------------------------------------------------------------

/// Handles the local adapter and peer discovery
pub struct BleDiscovery {
    adapter: Adapter,
    scanning: Arc<AtomicBool>,
}

impl BleDiscovery {
    /// Open the adapter selected by `config.adapter_index`
    pub async fn initialize(config: &BleTransportConfig) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;

        if adapters.is_empty() {
            return Err(BleTransportError::AdapterNotAvailable);
        }
        let available = adapters.len();
        let adapter = adapters.into_iter().nth(config.adapter_index).ok_or(
            BleTransportError::AdapterIndexOutOfRange {
                index: config.adapter_index,
                available,
            },
        )?;

        match adapter.adapter_info().await {
            Ok(info) => info!("BLE adapter initialized: {}", info),
            Err(e) => info!("BLE adapter initialized (no adapter info: {})", e),
        }

        Ok(Self {
            adapter,
            scanning: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Start an unfiltered scan; the tutor does not advertise its service
    pub async fn start_scanning(&self) -> Result<()> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        self.scanning.store(true, Ordering::SeqCst);
        info!("Started BLE scanning");
        Ok(())
    }

    pub async fn stop_scanning(&self) -> Result<()> {
        self.scanning.store(false, Ordering::SeqCst);
        self.adapter.stop_scan().await?;
        info!("Stopped BLE scanning");
        Ok(())
    }

    /// Look up a known peripheral by the address reported in scan results
    pub async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        for peripheral in self.adapter.peripherals().await? {
            let properties = peripheral.properties().await?;
            if peer_address(&peripheral, properties.as_ref()).eq_ignore_ascii_case(address) {
                return Ok(peripheral);
            }
        }
        Err(BleTransportError::PeerNotFound {
            address: address.to_string(),
        })
    }

    /// Forward adapter events as transport events.
    ///
    /// Sightings are only reported while scanning. A disconnect is only
    /// reported for the peripheral currently held in `link`.
    pub async fn spawn_event_pump(
        &self,
        events: EventSender,
        link: Arc<RwLock<Option<ActiveLink>>>,
    ) -> Result<JoinHandle<()>> {
        let mut stream = self
            .adapter
            .events()
            .await
            .map_err(|e| BleTransportError::EventStreamFailed(e.to_string()))?;
        let adapter = self.adapter.clone();
        let scanning = self.scanning.clone();

        Ok(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let translated = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)
                        if scanning.load(Ordering::SeqCst) =>
                    {
                        scan_result(&adapter, &id).await.map(LinkEvent::adapter)
                    }
                    CentralEvent::DeviceDisconnected(id) => link_lost(&link, &id).await,
                    _ => None,
                };

                if let Some(event) = translated {
                    if events.send(event).is_err() {
                        debug!("Transport event receiver dropped, stopping adapter event pump");
                        break;
                    }
                }
            }
            debug!("Adapter event pump ended");
        }))
    }
}

/// Address string used to identify a peer.
///
/// Platforms that hide the hardware address (all-zero `BDAddr`) fall back to
/// the platform peripheral id.
pub fn peer_address(peripheral: &Peripheral, properties: Option<&PeripheralProperties>) -> String {
    let address = properties
        .map(|p| p.address)
        .unwrap_or_else(|| peripheral.address());
    if address == BDAddr::from([0u8; 6]) {
        format!("{:?}", peripheral.id())
    } else {
        address.to_string()
    }
}

async fn scan_result(adapter: &Adapter, id: &PeripheralId) -> Option<TransportEvent> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            warn!("Sighted peripheral vanished before lookup: {}", e);
            return None;
        }
    };
    let properties = peripheral.properties().await.ok().flatten();
    let address = peer_address(&peripheral, properties.as_ref());
    let name = properties.and_then(|p| p.local_name);

    debug!("Sighted {} ({:?})", address, name);
    Some(TransportEvent::ScanResult { address, name })
}

async fn link_lost(link: &Arc<RwLock<Option<ActiveLink>>>, id: &PeripheralId) -> Option<LinkEvent> {
    let current = link.read().await;
    match current.as_ref() {
        Some(active) if &active.peripheral.id() == id => {
            info!("Peripheral {:?} disconnected", id);
            Some(LinkEvent::link(
                active.epoch,
                TransportEvent::ConnectionStateChanged {
                    status: GattStatus::Success,
                    state: LinkState::Disconnected,
                },
            ))
        }
        _ => None,
    }
}
