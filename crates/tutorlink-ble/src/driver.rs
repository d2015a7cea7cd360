//! Async session driver
//!
//! [`SessionDriver`] is the single execution context that owns a
//! [`BleManager`]. It serializes three inputs: transport events, caller
//! requests from any number of [`SessionHandle`]s, and the scan window timer.
//! Transport events always win a race, so a request observes every event
//! that was queued before it.
//!
//! Every connection attempt gets a fresh [`LinkEpoch`]. Link events stamped
//! with an older epoch belong to a released link and are dropped before they
//! reach the manager.

use std::collections::VecDeque;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};
use tutorlink_core::{
    BleManager, Effect, GattStatus, LinkState, Notice, PeerDevice, SessionConfig, SessionError,
    SessionHandlers, SessionState, TransportCommand, TransportEvent,
};

use crate::error::{BleTransportError, Result};
use crate::transport::{GattTransport, LinkEpoch, LinkEvent};

const REQUEST_QUEUE_DEPTH: usize = 32;

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
enum Request {
    StartScan(Reply<()>),
    StopScan(Reply<()>),
    Connect(String, Reply<std::result::Result<(), SessionError>>),
    Disconnect(Reply<()>),
    Send(String, Reply<std::result::Result<(), SessionError>>),
    State(Reply<SessionState>),
    TransferBusy(Reply<bool>),
    Peers(Reply<Vec<PeerDevice>>),
    Shutdown(Reply<()>),
}

/// Cloneable caller-side handle to a running [`SessionDriver`]
#[derive(Debug, Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
}

impl SessionHandle {
    async fn call<T>(&self, request: impl FnOnce(Reply<T>) -> Request) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(request(reply))
            .await
            .map_err(|_| BleTransportError::DriverClosed)?;
        response.await.map_err(|_| BleTransportError::DriverClosed)
    }

    /// Open a discovery window; the peer list arrives through the handlers
    pub async fn start_scan(&self) -> Result<()> {
        self.call(Request::StartScan).await
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.call(Request::StopScan).await
    }

    pub async fn connect(&self, address: impl Into<String>) -> Result<()> {
        let address = address.into();
        self.call(|reply| Request::Connect(address, reply)).await??;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.call(Request::Disconnect).await
    }

    /// Submit outbound text. Rejections are also announced as status notices.
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.call(|reply| Request::Send(text, reply)).await??;
        Ok(())
    }

    pub async fn state(&self) -> Result<SessionState> {
        self.call(Request::State).await
    }

    pub async fn is_ready(&self) -> Result<bool> {
        Ok(self.state().await?.is_ready())
    }

    /// `true` while an outbound message is still being transmitted
    pub async fn is_transferring(&self) -> Result<bool> {
        self.call(Request::TransferBusy).await
    }

    /// Peers collected by the current or last scan window
    pub async fn peers(&self) -> Result<Vec<PeerDevice>> {
        self.call(Request::Peers).await
    }

    /// Release the link and stop the driver
    pub async fn shutdown(&self) -> Result<()> {
        self.call(Request::Shutdown).await
    }
}

// ----------------------------------------------------------------------------
// Driver
// ----------------------------------------------------------------------------

/// Runs one BLE session against a [`GattTransport`]
pub struct SessionDriver<T: GattTransport> {
    manager: BleManager,
    transport: T,
    handlers: SessionHandlers,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    events_open: bool,
    requests: mpsc::Receiver<Request>,
    scan_deadline: Option<(u64, Instant)>,
    link: LinkEpoch,
}

impl<T: GattTransport> SessionDriver<T> {
    /// Build a driver and the handle used to talk to it.
    ///
    /// `events` must be the receiving end of the channel `transport` reports
    /// its outcomes on.
    pub fn new(
        config: SessionConfig,
        transport: T,
        events: mpsc::UnboundedReceiver<LinkEvent>,
        handlers: SessionHandlers,
    ) -> Result<(Self, SessionHandle)> {
        let manager = BleManager::new(config)?;
        let (requests_tx, requests) = mpsc::channel(REQUEST_QUEUE_DEPTH);

        let driver = Self {
            manager,
            transport,
            handlers,
            events,
            events_open: true,
            requests,
            scan_deadline: None,
            link: 0,
        };
        Ok((driver, SessionHandle { requests: requests_tx }))
    }

    /// Process inputs until shut down or every handle is dropped
    pub async fn run(mut self) {
        info!("BLE session driver starting");

        loop {
            let deadline = self.scan_deadline;
            tokio::select! {
                biased;

                event = self.events.recv(), if self.events_open => match event {
                    Some(event) => self.process_event(event).await,
                    None => {
                        warn!("Transport event channel closed");
                        self.events_open = false;
                    }
                },

                request = self.requests.recv() => match request {
                    Some(request) => {
                        if !self.process_request(request).await {
                            return;
                        }
                    }
                    None => {
                        info!("All session handles dropped, shutting down");
                        self.shutdown().await;
                        return;
                    }
                },

                _ = sleep_until(deadline.map(|(_, at)| at).unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    if let Some((generation, _)) = self.scan_deadline.take() {
                        let effects = self.manager.scan_window_elapsed(generation);
                        self.execute(effects).await;
                    }
                }
            }
        }
    }

    /// Returns `false` once the driver has been shut down
    async fn process_request(&mut self, request: Request) -> bool {
        match request {
            Request::StartScan(reply) => {
                let effects = self.manager.start_scan();
                self.execute(effects).await;
                let _ = reply.send(());
            }
            Request::StopScan(reply) => {
                self.scan_deadline = None;
                let effects = self.manager.stop_scan();
                self.execute(effects).await;
                let _ = reply.send(());
            }
            Request::Connect(address, reply) => {
                let result = self.manager.connect(&address);
                let _ = reply.send(self.settle(result).await);
            }
            Request::Disconnect(reply) => {
                let effects = self.manager.disconnect();
                self.execute(effects).await;
                let _ = reply.send(());
            }
            Request::Send(text, reply) => {
                let result = self.manager.send(&text);
                let _ = reply.send(self.settle(result).await);
            }
            Request::State(reply) => {
                let _ = reply.send(self.manager.state().clone());
            }
            Request::TransferBusy(reply) => {
                let _ = reply.send(self.manager.transfer().is_busy());
            }
            Request::Peers(reply) => {
                let _ = reply.send(self.manager.peers().to_vec());
            }
            Request::Shutdown(reply) => {
                self.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    /// Run the effects of an accepted request, or announce the rejection
    async fn settle(
        &mut self,
        result: std::result::Result<Vec<Effect>, SessionError>,
    ) -> std::result::Result<(), SessionError> {
        match result {
            Ok(effects) => {
                self.execute(effects).await;
                Ok(())
            }
            Err(e) => {
                debug!("Request rejected: {}", e);
                if let Some(status) = e.status_notice() {
                    self.handlers.dispatch(&Notice::Status(status));
                }
                Err(e)
            }
        }
    }

    async fn process_event(&mut self, event: LinkEvent) {
        if let Some(link) = event.link {
            if link != self.link {
                warn!(
                    "Dropping {} from released link {} (current {})",
                    event.event.kind(),
                    link,
                    self.link
                );
                return;
            }
        }
        let effects = self.manager.handle_event(event.event);
        self.execute(effects).await;
    }

    /// Carry out effects in order. A command the transport refuses outright is
    /// turned into the failure event it would otherwise have reported.
    async fn execute(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Transport(command) => {
                    if matches!(command, TransportCommand::Connect { .. }) {
                        self.link += 1;
                        debug!("Opening link {}", self.link);
                    }
                    if let Err(e) = self.transport.execute(&command, self.link).await {
                        error!("Transport rejected {}: {}", command_name(&command), e);
                        for event in failure_events(&command, &e) {
                            queue.extend(self.manager.handle_event(event));
                        }
                    }
                }
                Effect::Notify(notice) => self.handlers.dispatch(&notice),
                Effect::ScheduleScanStop { generation, after } => {
                    self.scan_deadline = Some((generation, Instant::now() + after));
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        let effects = self.manager.stop_scan();
        self.execute(effects).await;
        let effects = self.manager.disconnect();
        self.execute(effects).await;
        info!("BLE session driver stopped");
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn command_name(command: &TransportCommand) -> &'static str {
    match command {
        TransportCommand::StartScan => "StartScan",
        TransportCommand::StopScan => "StopScan",
        TransportCommand::Connect { .. } => "Connect",
        TransportCommand::DiscoverServices => "DiscoverServices",
        TransportCommand::Subscribe { .. } => "Subscribe",
        TransportCommand::WriteCharacteristic { .. } => "WriteCharacteristic",
        TransportCommand::Release => "Release",
    }
}

/// The events standing in for a command that could not be issued. A
/// missing or refused adapter is reported first so callers can tell it apart
/// from an unreachable peer.
fn failure_events(command: &TransportCommand, error: &BleTransportError) -> Vec<TransportEvent> {
    let reason = error.to_string();
    let unavailable = error.is_adapter_unavailable();

    let mut events = Vec::new();
    if unavailable
        && matches!(
            command,
            TransportCommand::StartScan | TransportCommand::Connect { .. }
        )
    {
        events.push(TransportEvent::AdapterUnavailable {
            reason: reason.clone(),
        });
    }
    match command {
        TransportCommand::StartScan if unavailable => {}
        _ => events.extend(failure_event(command, reason)),
    }
    events
}

fn failure_event(command: &TransportCommand, reason: String) -> Option<TransportEvent> {
    match command {
        TransportCommand::StartScan => Some(TransportEvent::ScanFailed { reason }),
        TransportCommand::Connect { .. } => Some(TransportEvent::ConnectionStateChanged {
            status: GattStatus::failure(reason),
            state: LinkState::Disconnected,
        }),
        TransportCommand::DiscoverServices => Some(TransportEvent::ServicesDiscovered {
            status: GattStatus::failure(reason),
            services: Vec::new(),
        }),
        TransportCommand::Subscribe { .. } => Some(TransportEvent::SubscriptionConfigured {
            notifications_enabled: false,
            descriptor_written: false,
        }),
        TransportCommand::WriteCharacteristic { .. } => Some(TransportEvent::CharacteristicWrite {
            status: GattStatus::failure(reason),
        }),
        TransportCommand::StopScan | TransportCommand::Release => None,
    }
}
