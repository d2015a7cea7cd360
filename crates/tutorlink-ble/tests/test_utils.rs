//! Test utilities for driving a session without a radio
//!
//! `MockTransport` records every command the driver issues and, when asked
//! to, plays the part of a well-behaved tutor peripheral by answering each
//! command with the events real hardware would produce.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tutorlink_ble::{
    BleTransportError, EventSender, GattTransport, LinkEpoch, LinkEvent, Result, SessionDriver,
    SessionHandle,
};
use tutorlink_core::{
    CharacteristicHandle, GattCharacteristic, GattService, GattStatus, LinkState, Notice,
    SessionConfig, SessionHandlers, TransportCommand, TransportEvent, WriteMode,
    CLIENT_CONFIG_DESCRIPTOR_UUID, TUTOR_CHARACTERISTIC_UUID, TUTOR_SERVICE_UUID,
};

pub const PEER: &str = "24:0A:C4:12:34:56";

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

/// How the simulated peripheral reacts to commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehaviour {
    /// Record only; the test injects every event itself
    Silent,
    /// Answer each command like a healthy tutor peripheral
    Responsive,
    /// Like `Responsive`, but the peer's ready notification overtakes the
    /// write-complete of each chunk
    RacingAck,
    /// Refuse connection requests outright
    Unreachable,
    /// No adapter present; scans and connects fail before reaching the radio
    AdapterOff,
}

/// Recording [`GattTransport`]
pub struct MockTransport {
    behaviour: PeerBehaviour,
    events: EventSender,
    commands: Arc<Mutex<Vec<TransportCommand>>>,
    link: LinkEpoch,
}

impl MockTransport {
    pub fn new(behaviour: PeerBehaviour, events: EventSender) -> Self {
        Self {
            behaviour,
            events,
            commands: Arc::new(Mutex::new(Vec::new())),
            link: 0,
        }
    }

    /// Shared view of the recorded commands
    pub fn commands(&self) -> Arc<Mutex<Vec<TransportCommand>>> {
        self.commands.clone()
    }

    fn record(&self, command: TransportCommand) {
        self.commands.lock().unwrap().push(command);
    }

    fn reply(&self, event: TransportEvent) {
        if matches!(
            self.behaviour,
            PeerBehaviour::Responsive | PeerBehaviour::RacingAck
        ) {
            self.events.send(LinkEvent::link(self.link, event)).unwrap();
        }
    }
}

#[async_trait]
impl GattTransport for MockTransport {
    async fn start_scan(&mut self) -> Result<()> {
        self.record(TransportCommand::StartScan);
        if self.behaviour == PeerBehaviour::AdapterOff {
            return Err(BleTransportError::AdapterNotAvailable);
        }
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<()> {
        self.record(TransportCommand::StopScan);
        Ok(())
    }

    async fn connect(&mut self, address: &str, link: LinkEpoch) -> Result<()> {
        self.record(TransportCommand::Connect {
            address: address.to_string(),
        });
        self.link = link;
        match self.behaviour {
            PeerBehaviour::Unreachable => {
                return Err(BleTransportError::PeerNotFound {
                    address: address.to_string(),
                })
            }
            PeerBehaviour::AdapterOff => return Err(BleTransportError::AdapterNotAvailable),
            _ => {}
        }
        self.reply(TransportEvent::ConnectionStateChanged {
            status: GattStatus::Success,
            state: LinkState::Connected,
        });
        Ok(())
    }

    async fn discover_services(&mut self) -> Result<()> {
        self.record(TransportCommand::DiscoverServices);
        self.reply(TransportEvent::ServicesDiscovered {
            status: GattStatus::Success,
            services: tutor_services(),
        });
        Ok(())
    }

    async fn subscribe(&mut self, handle: &CharacteristicHandle) -> Result<()> {
        self.record(TransportCommand::Subscribe {
            handle: handle.clone(),
        });
        self.reply(TransportEvent::SubscriptionConfigured {
            notifications_enabled: true,
            descriptor_written: true,
        });
        Ok(())
    }

    async fn write(
        &mut self,
        handle: &CharacteristicHandle,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        self.record(TransportCommand::WriteCharacteristic {
            handle: handle.clone(),
            value: value.to_vec(),
            mode,
        });
        // One write-complete and one empty ready notification per chunk
        let complete = TransportEvent::CharacteristicWrite {
            status: GattStatus::Success,
        };
        let ready = TransportEvent::CharacteristicChanged { value: Vec::new() };
        if self.behaviour == PeerBehaviour::RacingAck {
            self.reply(ready);
            self.reply(complete);
        } else {
            self.reply(complete);
            self.reply(ready);
        }
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        self.record(TransportCommand::Release);
        Ok(())
    }
}

pub fn tutor_services() -> Vec<GattService> {
    vec![GattService {
        uuid: TUTOR_SERVICE_UUID,
        characteristics: vec![GattCharacteristic {
            uuid: TUTOR_CHARACTERISTIC_UUID,
            descriptors: vec![CLIENT_CONFIG_DESCRIPTOR_UUID],
        }],
    }]
}

// ----------------------------------------------------------------------------
// Session Harness
// ----------------------------------------------------------------------------

/// A running driver plus everything a test needs to observe it
pub struct TestSession {
    pub session: SessionHandle,
    pub events: EventSender,
    pub notices: mpsc::UnboundedReceiver<Notice>,
    pub commands: Arc<Mutex<Vec<TransportCommand>>>,
}

impl TestSession {
    pub fn spawn(config: SessionConfig, behaviour: PeerBehaviour) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices) = mpsc::unbounded_channel();

        let transport = MockTransport::new(behaviour, events_tx.clone());
        let commands = transport.commands();

        let message_tx = notices_tx.clone();
        let peers_tx = notices_tx.clone();
        let handlers = SessionHandlers::new()
            .on_message_received(move |text| {
                let _ = message_tx.send(Notice::MessageReceived(text.to_string()));
            })
            .on_peer_list_ready(move |peers| {
                let _ = peers_tx.send(Notice::PeerListReady(peers.to_vec()));
            })
            .on_status(move |status| {
                let _ = notices_tx.send(Notice::Status(status.clone()));
            });

        let (driver, session) = SessionDriver::new(config, transport, events_rx, handlers).unwrap();
        tokio::spawn(driver.run());

        Self {
            session,
            events: events_tx,
            notices,
            commands,
        }
    }

    /// Wait until the driver has processed everything queued so far
    pub async fn settle(&self) {
        self.session.state().await.unwrap();
    }

    /// Notices dispatched so far
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            notices.push(notice);
        }
        notices
    }

    pub fn commands(&self) -> Vec<TransportCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Payloads of every characteristic write, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                TransportCommand::WriteCharacteristic { value, .. } => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Inject an event that is not tied to any link, e.g. a scan result
    pub fn inject(&self, event: TransportEvent) {
        self.events.send(LinkEvent::adapter(event)).unwrap();
    }

    /// Inject an event as if reported by the connection attempt `link`
    pub fn inject_for(&self, link: LinkEpoch, event: TransportEvent) {
        self.events.send(LinkEvent::link(link, event)).unwrap();
    }
}
