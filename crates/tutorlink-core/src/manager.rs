//! Session context tying discovery, connection and transfer together
//!
//! [`BleManager`] is the single owner of all mutable session state. It is
//! meant to live on one execution context that feeds it transport events and
//! caller requests strictly one at a time; no locking happens inside.

use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::connection_state::{ConnectionMachine, LinkSignal, SessionState, StateTransition};
use crate::error::{Result, SessionError};
use crate::event::{Effect, TransportEvent};
use crate::peer::PeerDevice;
use crate::scan::ScanCoordinator;
use crate::transfer::TransferProtocol;

// ----------------------------------------------------------------------------
// Session Context
// ----------------------------------------------------------------------------

/// Event-sourced BLE session
#[derive(Debug)]
pub struct BleManager {
    config: SessionConfig,
    scan: ScanCoordinator,
    connection: ConnectionMachine,
    transfer: TransferProtocol,
}

impl BleManager {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scan: ScanCoordinator::new(config.scan_duration()),
            connection: ConnectionMachine::new(config.service.clone(), config.write_mode),
            transfer: TransferProtocol::new(config.max_chunk_len, config.inbound),
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        self.connection.state()
    }

    pub fn is_ready(&self) -> bool {
        self.connection.state().is_ready()
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_scanning()
    }

    pub fn peers(&self) -> &[PeerDevice] {
        self.scan.peers()
    }

    pub fn transfer(&self) -> &TransferProtocol {
        &self.transfer
    }

    // ------------------------------------------------------------------------
    // Caller Operations
    // ------------------------------------------------------------------------

    pub fn start_scan(&mut self) -> Vec<Effect> {
        self.scan.start_scan()
    }

    pub fn stop_scan(&mut self) -> Vec<Effect> {
        self.scan.stop_scan()
    }

    /// Expiry of the scan timer armed by [`Effect::ScheduleScanStop`]
    pub fn scan_window_elapsed(&mut self, generation: u64) -> Vec<Effect> {
        self.scan.scan_window_elapsed(generation)
    }

    pub fn connect(&mut self, address: &str) -> Result<Vec<Effect>> {
        self.connection.connect(address)
    }

    pub fn disconnect(&mut self) -> Vec<Effect> {
        let transition = self.connection.disconnect();
        self.apply(transition)
    }

    /// Submit outbound text.
    ///
    /// Rejections leave every piece of state untouched and issue no transport
    /// request; [`SessionError::status_notice`] gives the matching notice.
    pub fn send(&mut self, text: &str) -> Result<Vec<Effect>> {
        let Some(handle) = self.connection.state().handle() else {
            warn!("Send attempted while {}", self.connection.state().name());
            return Err(SessionError::NotConnected);
        };
        let handle = handle.clone();
        self.transfer.send(text, &handle)
    }

    // ------------------------------------------------------------------------
    // Transport Events
    // ------------------------------------------------------------------------

    pub fn handle_event(&mut self, event: TransportEvent) -> Vec<Effect> {
        debug!("Handling {} in {}", event.kind(), self.connection.state().name());

        match event {
            TransportEvent::ScanResult { address, name } => {
                self.scan.on_scan_result(address, name);
                Vec::new()
            }
            TransportEvent::ScanFailed { reason } => self.scan.on_scan_failed(reason),
            TransportEvent::AdapterUnavailable { reason } => {
                self.scan.on_adapter_unavailable(reason)
            }
            TransportEvent::ConnectionStateChanged { status, state } => {
                let transition = self.connection.on_connection_state_changed(status, state);
                self.apply(transition)
            }
            TransportEvent::ServicesDiscovered { status, services } => {
                let transition = self.connection.on_services_discovered(status, &services);
                self.apply(transition)
            }
            TransportEvent::SubscriptionConfigured {
                notifications_enabled,
                descriptor_written,
            } => {
                let transition = self
                    .connection
                    .on_subscription_configured(notifications_enabled, descriptor_written);
                self.apply(transition)
            }
            TransportEvent::CharacteristicWrite { status } => {
                let Some(handle) = self.connection.state().handle() else {
                    warn!("Write completion while not ready, discarding");
                    return Vec::new();
                };
                let handle = handle.clone();
                self.transfer.on_write_complete(status, Some(&handle))
            }
            TransportEvent::CharacteristicChanged { value } => {
                let Some(handle) = self.connection.state().handle() else {
                    warn!("Notification while not ready, discarding");
                    return Vec::new();
                };
                let handle = handle.clone();
                self.transfer.on_characteristic_changed(&value, Some(&handle))
            }
        }
    }

    fn apply(&mut self, transition: StateTransition) -> Vec<Effect> {
        let mut effects = transition.effects;
        match transition.signal {
            Some(LinkSignal::TornDown) => self.transfer.reset(),
            Some(LinkSignal::Ready) => {
                self.transfer.reset();
                if let Some(greeting) = self.config.ready_greeting.clone() {
                    match self.send(&greeting) {
                        Ok(greeting_effects) => effects.extend(greeting_effects),
                        Err(e) => warn!("Failed to send ready greeting: {}", e),
                    }
                }
            }
            None => {}
        }
        effects
    }
}
