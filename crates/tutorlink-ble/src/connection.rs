//! BLE connection management and characteristic I/O
//!
//! Every request returns as soon as it has been issued. Its outcome is
//! reported later on the transport event channel, so the session driver is
//! never blocked behind a slow peripheral.

use std::sync::{Arc, Mutex, MutexGuard};

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use tutorlink_core::{
    CharacteristicHandle, GattCharacteristic, GattService, GattStatus, LinkState, TransportEvent,
    WriteMode,
};

use crate::config::BleTransportConfig;
use crate::error::{BleTransportError, Result};
use crate::transport::{EventSender, LinkEpoch, LinkEvent};

// ----------------------------------------------------------------------------
// Connection Management
// ----------------------------------------------------------------------------

/// The peripheral of the current connection attempt
#[derive(Debug, Clone)]
pub struct ActiveLink {
    pub epoch: LinkEpoch,
    pub peripheral: Peripheral,
}

/// Holds the single connected peripheral and performs GATT operations on it.
///
/// Operations run as background tasks that stamp their outcome with the
/// link epoch. `release` aborts whatever is still running.
pub struct BleConnection {
    config: BleTransportConfig,
    events: EventSender,
    link: Arc<RwLock<Option<ActiveLink>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BleConnection {
    pub fn new(config: BleTransportConfig, events: EventSender) -> Self {
        Self {
            config,
            events,
            link: Arc::new(RwLock::new(None)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Shared slot of the current link, watched by the adapter event pump
    pub fn link(&self) -> Arc<RwLock<Option<ActiveLink>>> {
        self.link.clone()
    }

    /// Connect to `peripheral` within the configured timeout
    pub async fn connect(&self, peripheral: Peripheral, epoch: LinkEpoch) {
        *self.link.write().await = Some(ActiveLink {
            epoch,
            peripheral: peripheral.clone(),
        });

        let events = self.events.clone();
        let limit = self.config.connection_timeout();
        self.track(tokio::spawn(async move {
            let status = match timeout(limit, peripheral.connect()).await {
                Ok(Ok(())) => {
                    info!("Connected to peripheral {:?}", peripheral.id());
                    GattStatus::Success
                }
                Ok(Err(e)) => {
                    error!("Failed to connect to peripheral: {}", e);
                    GattStatus::failure(e.to_string())
                }
                Err(_) => {
                    error!("Connection timed out after {:?}", limit);
                    GattStatus::failure(BleTransportError::ConnectionTimeout.to_string())
                }
            };
            let state = if status.is_success() {
                LinkState::Connected
            } else {
                LinkState::Disconnected
            };
            emit(
                &events,
                epoch,
                TransportEvent::ConnectionStateChanged { status, state },
            );
        }));
    }

    /// Enumerate services within the configured timeout
    pub async fn discover_services(&self) -> Result<()> {
        let ActiveLink { epoch, peripheral } = self.active().await?;
        let events = self.events.clone();
        let limit = self.config.discovery_timeout();

        self.track(tokio::spawn(async move {
            let event = match timeout(limit, peripheral.discover_services()).await {
                Ok(Ok(())) => {
                    let services = service_table(&peripheral);
                    debug!("Discovered {} service(s)", services.len());
                    TransportEvent::ServicesDiscovered {
                        status: GattStatus::Success,
                        services,
                    }
                }
                Ok(Err(e)) => {
                    error!("Failed to discover services: {}", e);
                    TransportEvent::ServicesDiscovered {
                        status: GattStatus::failure(e.to_string()),
                        services: Vec::new(),
                    }
                }
                Err(_) => {
                    error!("Service discovery timed out after {:?}", limit);
                    TransportEvent::ServicesDiscovered {
                        status: GattStatus::failure(BleTransportError::DiscoveryTimeout.to_string()),
                        services: Vec::new(),
                    }
                }
            };
            emit(&events, epoch, event);
        }));
        Ok(())
    }

    /// Enable notifications on the characteristic and start forwarding them.
    ///
    /// btleplug writes the client configuration descriptor as part of
    /// `subscribe`, so both halves of the result share one outcome.
    pub async fn subscribe(&self, handle: &CharacteristicHandle) -> Result<()> {
        let ActiveLink { epoch, peripheral } = self.active().await?;
        let characteristic = find_characteristic(&peripheral, handle)?;
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| BleTransportError::NotificationStreamFailed(e.to_string()))?;

        let events = self.events.clone();
        let target = handle.characteristic;
        self.track(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != target {
                    continue;
                }
                let event = TransportEvent::CharacteristicChanged {
                    value: notification.value,
                };
                if !emit(&events, epoch, event) {
                    break;
                }
            }
            debug!("Notification pump ended");
        }));

        let events = self.events.clone();
        self.track(tokio::spawn(async move {
            let enabled = match peripheral.subscribe(&characteristic).await {
                Ok(()) => {
                    info!("Subscribed to notifications on {}", characteristic.uuid);
                    true
                }
                Err(e) => {
                    error!("Failed to subscribe to notifications: {}", e);
                    false
                }
            };
            emit(
                &events,
                epoch,
                TransportEvent::SubscriptionConfigured {
                    notifications_enabled: enabled,
                    descriptor_written: enabled,
                },
            );
        }));
        Ok(())
    }

    /// Write one chunk to the characteristic
    pub async fn write(
        &self,
        handle: &CharacteristicHandle,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        let ActiveLink { epoch, peripheral } = self.active().await?;
        let characteristic = find_characteristic(&peripheral, handle)?;
        let value = value.to_vec();
        let events = self.events.clone();

        self.track(tokio::spawn(async move {
            let status = match peripheral
                .write(&characteristic, &value, write_type(mode))
                .await
            {
                Ok(()) => GattStatus::Success,
                Err(e) => {
                    error!("Failed to write to characteristic: {}", e);
                    GattStatus::failure(e.to_string())
                }
            };
            emit(&events, epoch, TransportEvent::CharacteristicWrite { status });
        }));
        Ok(())
    }

    /// Cancel pending operations, close the link and forget the peripheral
    pub async fn release(&self) -> Result<()> {
        let cancelled = self.cancel_tasks();
        let Some(ActiveLink { epoch, peripheral }) = self.link.write().await.take() else {
            return Ok(());
        };
        if cancelled > 0 {
            debug!("Cancelled {} pending operation(s) on link {}", cancelled, epoch);
        }

        match peripheral.is_connected().await {
            Ok(true) => {
                peripheral.disconnect().await?;
                info!("Disconnected from peripheral {:?}", peripheral.id());
            }
            // A cancelled connect may still bring the link up underneath
            _ if cancelled > 0 => {
                if let Err(e) = peripheral.disconnect().await {
                    debug!("Disconnect after cancelling link {}: {}", epoch, e);
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn active(&self) -> Result<ActiveLink> {
        self.link
            .read()
            .await
            .clone()
            .ok_or(BleTransportError::PeerNotConnected)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.lock_tasks();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Abort every unfinished operation; returns how many were still running
    fn cancel_tasks(&self) -> usize {
        let mut cancelled = 0;
        for task in self.lock_tasks().drain(..) {
            if !task.is_finished() {
                task.abort();
                cancelled += 1;
            }
        }
        cancelled
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn emit(events: &EventSender, epoch: LinkEpoch, event: TransportEvent) -> bool {
    if events.send(LinkEvent::link(epoch, event)).is_err() {
        warn!("Transport event receiver dropped");
        return false;
    }
    true
}

pub fn write_type(mode: WriteMode) -> WriteType {
    match mode {
        WriteMode::WithResponse => WriteType::WithResponse,
        WriteMode::WithoutResponse => WriteType::WithoutResponse,
    }
}

fn find_characteristic(
    peripheral: &Peripheral,
    handle: &CharacteristicHandle,
) -> Result<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == handle.characteristic && c.service_uuid == handle.service)
        .ok_or(BleTransportError::CharacteristicNotFound {
            characteristic: handle.characteristic,
        })
}

fn service_table(peripheral: &Peripheral) -> Vec<GattService> {
    peripheral
        .services()
        .into_iter()
        .map(|service| GattService {
            uuid: service.uuid,
            characteristics: service
                .characteristics
                .into_iter()
                .map(|c| GattCharacteristic {
                    uuid: c.uuid,
                    descriptors: c.descriptors.into_iter().map(|d| d.uuid).collect(),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_type_mapping() {
        assert_eq!(write_type(WriteMode::WithResponse), WriteType::WithResponse);
        assert_eq!(
            write_type(WriteMode::WithoutResponse),
            WriteType::WithoutResponse
        );
    }
}
