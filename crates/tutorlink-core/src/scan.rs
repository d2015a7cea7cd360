//! Time-boxed peer discovery

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::event::{Effect, Notice, StatusNotice, TransportCommand};
use crate::peer::{PeerDevice, PeerRegistry};

// ----------------------------------------------------------------------------
// Scan Coordinator
// ----------------------------------------------------------------------------

/// Runs one discovery window at a time and collects the peers it sees
#[derive(Debug)]
pub struct ScanCoordinator {
    registry: PeerRegistry,
    scanning: bool,
    /// Identifies the current window so stale expiry timers can be ignored
    generation: u64,
    duration: Duration,
}

impl ScanCoordinator {
    pub fn new(duration: Duration) -> Self {
        Self {
            registry: PeerRegistry::new(),
            scanning: false,
            generation: 0,
            duration,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Peers seen in the current (or last completed) window
    pub fn peers(&self) -> &[PeerDevice] {
        self.registry.peers()
    }

    /// Open a new discovery window. No-op while one is already open.
    pub fn start_scan(&mut self) -> Vec<Effect> {
        if self.scanning {
            debug!("Scan already running, ignoring start request");
            return Vec::new();
        }

        self.registry.clear();
        self.scanning = true;
        self.generation += 1;
        info!(
            "Scan started (window {}, {} ms)",
            self.generation,
            self.duration.as_millis()
        );

        vec![
            Effect::Transport(TransportCommand::StartScan),
            Effect::ScheduleScanStop {
                generation: self.generation,
                after: self.duration,
            },
        ]
    }

    /// Expiry of the timer armed for window `generation`
    pub fn scan_window_elapsed(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation {
            debug!(
                "Ignoring expiry of stale scan window {} (current {})",
                generation, self.generation
            );
            return Vec::new();
        }
        self.stop_scan()
    }

    /// Close the window and hand the collected peers to the presentation layer
    pub fn stop_scan(&mut self) -> Vec<Effect> {
        if !self.scanning {
            return Vec::new();
        }
        self.scanning = false;

        let mut effects = vec![Effect::Transport(TransportCommand::StopScan)];
        if self.registry.is_empty() {
            info!("Scan complete, no devices found");
            effects.push(Effect::status(StatusNotice::NoPeersFound));
        } else {
            for peer in self.registry.peers() {
                debug!("Found device address: {}", peer.address);
            }
            info!("Scan complete, {} device(s) found", self.registry.len());
            effects.push(Effect::Notify(Notice::PeerListReady(
                self.registry.peers().to_vec(),
            )));
        }
        effects
    }

    pub fn on_scan_result(&mut self, address: String, name: Option<String>) {
        if !self.scanning {
            debug!("Scan result for {} outside a scan window, ignoring", address);
            return;
        }
        if self.registry.upsert(PeerDevice::new(address.clone(), name)) {
            debug!("Discovered peer {}", address);
        }
    }

    pub fn on_scan_failed(&mut self, reason: String) -> Vec<Effect> {
        warn!("BLE scan failed: {}", reason);
        self.scanning = false;
        vec![Effect::status(StatusNotice::ScanFailed { reason })]
    }

    /// The adapter went away; any scan window is over
    pub fn on_adapter_unavailable(&mut self, reason: String) -> Vec<Effect> {
        warn!("BLE adapter unavailable: {}", reason);
        self.scanning = false;
        vec![Effect::status(StatusNotice::TransportUnavailable { reason })]
    }
}
