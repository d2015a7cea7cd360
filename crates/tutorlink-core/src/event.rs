//! Events consumed and effects produced by the session
//!
//! The session is driven exclusively by a closed set of [`TransportEvent`]s
//! plus the caller operations on [`BleManager`](crate::BleManager). Every step
//! answers with a list of [`Effect`]s: transport requests to issue, notices
//! for the collaborators, and timers to arm.

use std::fmt;
use std::time::Duration;

use crate::connection_state::{CharacteristicHandle, DisconnectReason};
use crate::peer::PeerDevice;
use crate::protocol::{GattService, GattStatus, WriteMode};

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Link state reported alongside a connection state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Asynchronous events delivered by the transport adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peripheral was seen during discovery
    ScanResult {
        address: String,
        name: Option<String>,
    },
    /// Discovery could not be started or aborted
    ScanFailed { reason: String },
    /// The adapter is missing, powered off or not permitted
    AdapterUnavailable { reason: String },
    /// The link changed state, or a connection attempt completed
    ConnectionStateChanged { status: GattStatus, state: LinkState },
    /// Service discovery completed
    ServicesDiscovered {
        status: GattStatus,
        services: Vec<GattService>,
    },
    /// Outcome of enabling notifications and writing the CCCD
    SubscriptionConfigured {
        notifications_enabled: bool,
        descriptor_written: bool,
    },
    /// A characteristic write completed
    CharacteristicWrite { status: GattStatus },
    /// The peer notified a new characteristic value
    CharacteristicChanged { value: Vec<u8> },
}

impl TransportEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::ScanResult { .. } => "ScanResult",
            TransportEvent::ScanFailed { .. } => "ScanFailed",
            TransportEvent::AdapterUnavailable { .. } => "AdapterUnavailable",
            TransportEvent::ConnectionStateChanged { .. } => "ConnectionStateChanged",
            TransportEvent::ServicesDiscovered { .. } => "ServicesDiscovered",
            TransportEvent::SubscriptionConfigured { .. } => "SubscriptionConfigured",
            TransportEvent::CharacteristicWrite { .. } => "CharacteristicWrite",
            TransportEvent::CharacteristicChanged { .. } => "CharacteristicChanged",
        }
    }
}

// ----------------------------------------------------------------------------
// Effects
// ----------------------------------------------------------------------------

/// Requests issued to the transport adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    StartScan,
    StopScan,
    Connect { address: String },
    DiscoverServices,
    /// Enable local notifications and write the CCCD to the peer
    Subscribe { handle: CharacteristicHandle },
    WriteCharacteristic {
        handle: CharacteristicHandle,
        value: Vec<u8>,
        mode: WriteMode,
    },
    /// Disconnect and close the connection handle
    Release,
}

/// Human-readable state and error notices for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusNotice {
    Connected { address: String },
    Disconnected { reason: DisconnectReason },
    NotConnected,
    Busy,
    NoPeersFound,
    ScanFailed { reason: String },
    SubscriptionFailed,
    TransmissionFailed { reason: String },
    TransportUnavailable { reason: String },
}

impl fmt::Display for StatusNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusNotice::Connected { address } => write!(f, "Connected to {}", address),
            StatusNotice::Disconnected { reason } => write!(f, "Disconnected: {}", reason),
            StatusNotice::NotConnected => write!(f, "BLE NOT CONNECTED!"),
            StatusNotice::Busy => write!(f, "Previous message is still being sent"),
            StatusNotice::NoPeersFound => write!(f, "No BLE Device"),
            StatusNotice::ScanFailed { reason } => write!(f, "BLE scan failed: {}", reason),
            StatusNotice::SubscriptionFailed => {
                write!(f, "Could not enable notifications; reconnect to retry")
            }
            StatusNotice::TransmissionFailed { reason } => {
                write!(f, "Message abandoned, write failed: {}", reason)
            }
            StatusNotice::TransportUnavailable { reason } => {
                write!(f, "Bluetooth unavailable: {}", reason)
            }
        }
    }
}

/// Deliveries to the registered collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    MessageReceived(String),
    PeerListReady(Vec<PeerDevice>),
    Status(StatusNotice),
}

/// Output of a single session step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Transport(TransportCommand),
    Notify(Notice),
    /// Arm the one-shot timer that ends scan window `generation`
    ScheduleScanStop {
        generation: u64,
        after: Duration,
    },
}

impl Effect {
    pub fn status(notice: StatusNotice) -> Self {
        Effect::Notify(Notice::Status(notice))
    }
}
