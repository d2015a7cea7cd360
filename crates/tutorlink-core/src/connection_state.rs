//! Connection lifecycle state machine
//!
//! Drives a single link through
//! `Disconnected → Connecting → DiscoveringServices → Ready` and back to
//! `Disconnected` on any failure. Transitions happen only in response to
//! transport events and the explicit `connect` / `disconnect` requests, and
//! the machine never moves from `Connecting` to `Ready` without passing
//! through `DiscoveringServices`.

use std::fmt;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::event::{Effect, LinkState, StatusNotice, TransportCommand};
use crate::protocol::{GattService, GattStatus, Lookup, ServiceContract, WriteMode};

// ----------------------------------------------------------------------------
// State Types
// ----------------------------------------------------------------------------

/// The resolved characteristic and its notification descriptor.
///
/// Only handed out while the session is `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub descriptor: Uuid,
    pub write_mode: WriteMode,
}

/// Why a session ended up disconnected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    LocalRequest,
    /// The peer or the platform dropped an established link
    LinkLost,
    /// The transport reported a non-success status
    ConnectionFailed { reason: String },
    DiscoveryFailed { reason: String },
    ServiceNotFound,
    CharacteristicNotFound,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::LocalRequest => write!(f, "disconnect requested"),
            DisconnectReason::LinkLost => write!(f, "link lost"),
            DisconnectReason::ConnectionFailed { reason } => {
                write!(f, "connection failed: {}", reason)
            }
            DisconnectReason::DiscoveryFailed { reason } => {
                write!(f, "service discovery failed: {}", reason)
            }
            DisconnectReason::ServiceNotFound => write!(f, "tutor service not found"),
            DisconnectReason::CharacteristicNotFound => {
                write!(f, "tutor characteristic not found")
            }
        }
    }
}

/// Progress inside `DiscoveringServices`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStage {
    AwaitingServices,
    AwaitingSubscription { handle: CharacteristicHandle },
    /// Enabling notifications failed; the session stays here until torn down
    Failed { handle: CharacteristicHandle },
}

/// Lifecycle state of the single BLE link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected {
        reason: Option<DisconnectReason>,
    },
    Connecting {
        address: String,
    },
    DiscoveringServices {
        address: String,
        stage: SubscriptionStage,
    },
    Ready {
        address: String,
        handle: CharacteristicHandle,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Disconnected { .. } => "Disconnected",
            SessionState::Connecting { .. } => "Connecting",
            SessionState::DiscoveringServices { .. } => "DiscoveringServices",
            SessionState::Ready { .. } => "Ready",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, SessionState::Disconnected { .. })
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            SessionState::Disconnected { .. } => None,
            SessionState::Connecting { address }
            | SessionState::DiscoveringServices { address, .. }
            | SessionState::Ready { address, .. } => Some(address),
        }
    }

    /// The characteristic handle, valid only while `Ready`
    pub fn handle(&self) -> Option<&CharacteristicHandle> {
        match self {
            SessionState::Ready { handle, .. } => Some(handle),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected { reason: Some(reason) } => {
                write!(f, "Disconnected ({})", reason)
            }
            SessionState::Disconnected { reason: None } => write!(f, "Disconnected"),
            SessionState::Connecting { address } => write!(f, "Connecting to {}", address),
            SessionState::DiscoveringServices { address, .. } => {
                write!(f, "Discovering services on {}", address)
            }
            SessionState::Ready { address, .. } => write!(f, "Ready ({})", address),
        }
    }
}

// ----------------------------------------------------------------------------
// State Transition Results
// ----------------------------------------------------------------------------

/// Link-level milestones the transfer protocol has to react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSignal {
    /// The link became usable; sends may begin
    Ready,
    /// The link was torn down; transfer state must be reset
    TornDown,
}

/// Result of feeding one event into the machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateTransition {
    pub effects: Vec<Effect>,
    pub signal: Option<LinkSignal>,
}

impl StateTransition {
    fn none() -> Self {
        Self::default()
    }

    fn effects(effects: Vec<Effect>) -> Self {
        Self {
            effects,
            signal: None,
        }
    }
}

// ----------------------------------------------------------------------------
// State Machine Implementation
// ----------------------------------------------------------------------------

/// Owns the `SessionState` of one link
#[derive(Debug)]
pub struct ConnectionMachine {
    state: SessionState,
    contract: ServiceContract,
    write_mode: WriteMode,
}

impl ConnectionMachine {
    pub fn new(contract: ServiceContract, write_mode: WriteMode) -> Self {
        Self {
            state: SessionState::Disconnected { reason: None },
            contract,
            write_mode,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Begin a connection attempt. Only legal while disconnected.
    pub fn connect(&mut self, address: &str) -> Result<Vec<Effect>> {
        match &self.state {
            SessionState::Disconnected { .. } => {}
            SessionState::Ready { address, .. } => {
                return Err(SessionError::AlreadyConnected {
                    address: address.clone(),
                })
            }
            other => {
                return Err(SessionError::ConnectionInProgress {
                    state: other.name(),
                })
            }
        }

        info!("Connecting to {}", address);
        self.transition_to(SessionState::Connecting {
            address: address.to_string(),
        });
        Ok(vec![Effect::Transport(TransportCommand::Connect {
            address: address.to_string(),
        })])
    }

    /// Explicit tear-down requested by the caller
    pub fn disconnect(&mut self) -> StateTransition {
        self.tear_down(DisconnectReason::LocalRequest)
    }

    pub fn on_connection_state_changed(
        &mut self,
        status: GattStatus,
        link: LinkState,
    ) -> StateTransition {
        debug!(
            "Connection state change in {}: status={:?} link={:?}",
            self.state.name(),
            status,
            link
        );

        if let GattStatus::Failure { reason } = status {
            return self.tear_down(DisconnectReason::ConnectionFailed { reason });
        }

        match link {
            LinkState::Disconnected => self.tear_down(DisconnectReason::LinkLost),
            LinkState::Connected => {
                let SessionState::Connecting { address } = &self.state else {
                    warn!(
                        "Ignoring connected event while {}",
                        self.state.name()
                    );
                    return StateTransition::none();
                };
                let address = address.clone();
                info!("Connected with GATT server {}, discovering services", address);
                self.transition_to(SessionState::DiscoveringServices {
                    address,
                    stage: SubscriptionStage::AwaitingServices,
                });
                StateTransition::effects(vec![Effect::Transport(
                    TransportCommand::DiscoverServices,
                )])
            }
        }
    }

    pub fn on_services_discovered(
        &mut self,
        status: GattStatus,
        services: &[GattService],
    ) -> StateTransition {
        let SessionState::DiscoveringServices {
            address,
            stage: SubscriptionStage::AwaitingServices,
        } = &self.state
        else {
            warn!("Ignoring services-discovered event while {}", self.state.name());
            return StateTransition::none();
        };
        let address = address.clone();

        if let GattStatus::Failure { reason } = status {
            return self.tear_down(DisconnectReason::DiscoveryFailed { reason });
        }

        match self.contract.locate(services) {
            Lookup::ServiceMissing => self.tear_down(DisconnectReason::ServiceNotFound),
            Lookup::CharacteristicMissing => {
                self.tear_down(DisconnectReason::CharacteristicNotFound)
            }
            Lookup::Found(characteristic) => {
                let handle = CharacteristicHandle {
                    service: self.contract.service,
                    characteristic: characteristic.uuid,
                    descriptor: self.contract.descriptor,
                    write_mode: self.write_mode,
                };
                info!(
                    "Resolved characteristic {} ({:?}), enabling notifications",
                    handle.characteristic, handle.write_mode
                );
                self.transition_to(SessionState::DiscoveringServices {
                    address,
                    stage: SubscriptionStage::AwaitingSubscription {
                        handle: handle.clone(),
                    },
                });
                StateTransition::effects(vec![Effect::Transport(TransportCommand::Subscribe {
                    handle,
                })])
            }
        }
    }

    pub fn on_subscription_configured(
        &mut self,
        notifications_enabled: bool,
        descriptor_written: bool,
    ) -> StateTransition {
        let SessionState::DiscoveringServices {
            address,
            stage: SubscriptionStage::AwaitingSubscription { handle },
        } = &self.state
        else {
            warn!("Ignoring subscription result while {}", self.state.name());
            return StateTransition::none();
        };
        let address = address.clone();
        let handle = handle.clone();

        info!(
            "GATT initialized: {}, descriptor initialized: {}",
            notifications_enabled, descriptor_written
        );

        if notifications_enabled && descriptor_written {
            self.transition_to(SessionState::Ready {
                address: address.clone(),
                handle,
            });
            return StateTransition {
                effects: vec![Effect::status(StatusNotice::Connected { address })],
                signal: Some(LinkSignal::Ready),
            };
        }

        warn!("Notification setup failed on {}, session stalled until reconnect", address);
        self.transition_to(SessionState::DiscoveringServices {
            address,
            stage: SubscriptionStage::Failed { handle },
        });
        StateTransition::effects(vec![Effect::status(StatusNotice::SubscriptionFailed)])
    }

    fn tear_down(&mut self, reason: DisconnectReason) -> StateTransition {
        if self.state.is_disconnected() {
            debug!("Already disconnected, ignoring tear-down ({})", reason);
            return StateTransition::none();
        }

        info!("Tearing down session: {}", reason);
        self.transition_to(SessionState::Disconnected {
            reason: Some(reason.clone()),
        });
        StateTransition {
            effects: vec![
                Effect::Transport(TransportCommand::Release),
                Effect::status(StatusNotice::Disconnected { reason }),
            ],
            signal: Some(LinkSignal::TornDown),
        }
    }

    fn transition_to(&mut self, next: SessionState) {
        debug!("Session state {} -> {}", self.state.name(), next.name());
        self.state = next;
    }
}
