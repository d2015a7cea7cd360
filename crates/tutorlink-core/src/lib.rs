//! Sans-I/O BLE session protocol for the tutor peripheral
//!
//! This crate holds everything about talking to the tutor peripheral that
//! does not touch a radio: discovering peers, walking a single link through
//! connect → service discovery → notification subscription, and moving text
//! across one characteristic in bounded, acknowledgement-gated chunks.
//!
//! ## Architecture
//!
//! - [`config`] - Session configuration
//! - [`error`] - Caller-facing error types
//! - [`protocol`] - Service contract UUIDs, constants and GATT primitives
//! - [`event`] - Transport events in, effects out
//! - [`peer`] - Discovered peers and the address-keyed registry
//! - [`scan`] - Time-boxed discovery windows
//! - [`connection_state`] - Connection lifecycle state machine
//! - [`transfer`] - Chunked outbound transfer and inbound delivery
//! - [`manager`] - [`BleManager`], the session context combining the above
//! - [`handlers`] - Collaborator callbacks
//!
//! ## Usage
//!
//! ```rust
//! use tutorlink_core::{BleManager, Effect, SessionConfig, TransportCommand};
//!
//! let mut manager = BleManager::new(SessionConfig::default()).unwrap();
//! let effects = manager.start_scan();
//! assert!(matches!(effects[0], Effect::Transport(TransportCommand::StartScan)));
//!
//! // Not connected yet: rejected without touching the transport
//! assert!(manager.send("E major").is_err());
//! ```

pub mod config;
pub mod connection_state;
pub mod error;
pub mod event;
pub mod handlers;
pub mod manager;
pub mod peer;
pub mod protocol;
pub mod scan;
pub mod transfer;

// Public API exports
pub use config::{InboundPolicy, SessionConfig};
pub use connection_state::{
    CharacteristicHandle, ConnectionMachine, DisconnectReason, LinkSignal, SessionState,
    StateTransition, SubscriptionStage,
};
pub use error::{ConfigError, Result, SessionError};
pub use event::{Effect, LinkState, Notice, StatusNotice, TransportCommand, TransportEvent};
pub use handlers::SessionHandlers;
pub use manager::BleManager;
pub use peer::{PeerDevice, PeerRegistry};
pub use protocol::{
    GattCharacteristic, GattService, GattStatus, ServiceContract, WriteMode,
    CLIENT_CONFIG_DESCRIPTOR_UUID, DEFAULT_MAX_CHUNK_LEN,
    MESSAGE_TERMINATOR, TUTOR_CHARACTERISTIC_UUID, TUTOR_SERVICE_UUID,
};
pub use scan::ScanCoordinator;
pub use transfer::{chunk_message, InboundAssembler, OutboundMessageBuffer, TransferProtocol};
