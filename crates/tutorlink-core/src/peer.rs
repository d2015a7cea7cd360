//! Discovered peer bookkeeping

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Peer Device
// ----------------------------------------------------------------------------

/// A peripheral seen during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDevice {
    /// Opaque transport address, unique per peer
    pub address: String,
    /// Advertised local name, if any
    pub name: Option<String>,
}

impl PeerDevice {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Picker label: `<name> / <address>`
impl fmt::Display for PeerDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.display_name(), self.address)
    }
}

// ----------------------------------------------------------------------------
// Peer Registry
// ----------------------------------------------------------------------------

/// Address-keyed peer table that remembers first-seen order
#[derive(Debug, Default, Clone)]
pub struct PeerRegistry {
    peers: Vec<PeerDevice>,
    index: HashMap<String, usize>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a peer. Returns `true` when the address is new.
    pub fn upsert(&mut self, device: PeerDevice) -> bool {
        match self.index.get(&device.address) {
            Some(&slot) => {
                self.peers[slot] = device;
                false
            }
            None => {
                self.index.insert(device.address.clone(), self.peers.len());
                self.peers.push(device);
                true
            }
        }
    }

    pub fn clear(&mut self) {
        self.peers.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peers in first-seen order
    pub fn peers(&self) -> &[PeerDevice] {
        &self.peers
    }
}
