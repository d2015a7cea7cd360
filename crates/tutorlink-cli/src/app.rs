//! Application wiring: BLE transport, session driver and notice stream

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use tutorlink_ble::{BleTransportError, BtleplugTransport, SessionDriver, SessionHandle};
use tutorlink_core::{Notice, PeerDevice, SessionHandlers, StatusNotice};

use crate::config::AppConfig;
use crate::error::{CliError, Result};

const TRANSFER_POLL_INTERVAL: Duration = Duration::from_millis(50);
const HANDSHAKE_GRACE: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Application
// ----------------------------------------------------------------------------

/// A running BLE session and the notices it produces
pub struct TutorApp {
    session: SessionHandle,
    notices: mpsc::UnboundedReceiver<Notice>,
    driver: JoinHandle<()>,
    handshake_timeout: Duration,
}

impl TutorApp {
    /// Open the adapter and start the session driver
    pub async fn start(config: &AppConfig) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = BtleplugTransport::new(config.ble.clone(), events_tx)
            .await
            .map_err(CliError::startup)?;

        let (notices_tx, notices) = mpsc::unbounded_channel();
        let (driver, session) = SessionDriver::new(
            config.session.clone(),
            transport,
            events_rx,
            notice_forwarder(notices_tx),
        )?;
        let driver = tokio::spawn(driver.run());
        info!("BLE session started");

        Ok(Self {
            session,
            notices,
            driver,
            handshake_timeout: config.ble.connection_timeout()
                + config.ble.discovery_timeout()
                + HANDSHAKE_GRACE,
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub async fn next_notice(&mut self) -> Option<Notice> {
        self.notices.recv().await
    }

    /// Run one discovery window and return what it found
    pub async fn scan(&mut self) -> Result<Vec<PeerDevice>> {
        self.session.start_scan().await?;

        while let Some(notice) = self.notices.recv().await {
            match notice {
                Notice::PeerListReady(peers) => return Ok(peers),
                Notice::Status(StatusNotice::NoPeersFound) => return Ok(Vec::new()),
                Notice::Status(StatusNotice::ScanFailed { reason }) => {
                    return Err(CliError::ScanFailed(reason))
                }
                Notice::Status(status @ StatusNotice::TransportUnavailable { .. }) => {
                    return Err(CliError::Unavailable(status))
                }
                other => debug!("Ignoring {:?} while scanning", other),
            }
        }
        Err(BleTransportError::DriverClosed.into())
    }

    /// Connect and wait until the session is ready
    pub async fn connect(&mut self, address: &str) -> Result<()> {
        self.session.connect(address).await?;

        let notices = &mut self.notices;
        let handshake = async {
            while let Some(notice) = notices.recv().await {
                match notice {
                    Notice::Status(StatusNotice::Connected { address }) => {
                        info!("Session ready with {}", address);
                        return Ok(());
                    }
                    Notice::Status(StatusNotice::Disconnected { reason }) => {
                        return Err(CliError::ConnectionFailed(reason.to_string()))
                    }
                    Notice::Status(StatusNotice::SubscriptionFailed) => {
                        return Err(CliError::ConnectionFailed(
                            StatusNotice::SubscriptionFailed.to_string(),
                        ))
                    }
                    other => debug!("Ignoring {:?} while connecting", other),
                }
            }
            Err(BleTransportError::DriverClosed.into())
        };

        match timeout(self.handshake_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => {
                self.session.disconnect().await?;
                Err(CliError::Timeout("the session to become ready"))
            }
        }
    }

    /// Wait for the outbound message in flight to drain
    ///
    /// An abandoned transfer also drains, so the notices seen meanwhile decide
    /// whether it was delivered.
    pub async fn wait_for_transfer(&mut self, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;
        while self.session.is_transferring().await? {
            if Instant::now() >= deadline {
                return Err(CliError::Timeout("the message to be delivered"));
            }
            sleep(TRANSFER_POLL_INTERVAL).await;
        }

        while let Ok(notice) = self.notices.try_recv() {
            match notice {
                Notice::Status(StatusNotice::TransmissionFailed { reason }) => {
                    return Err(CliError::ConnectionFailed(reason))
                }
                Notice::Status(StatusNotice::Disconnected { reason }) => {
                    return Err(CliError::ConnectionFailed(reason.to_string()))
                }
                other => debug!("Ignoring {:?} after transfer", other),
            }
        }
        Ok(())
    }

    /// Release the link and stop the driver
    pub async fn stop(self) -> Result<()> {
        if let Err(e) = self.session.shutdown().await {
            warn!("Session driver already stopped: {}", e);
        }
        if let Err(e) = self.driver.await {
            warn!("Session driver task failed: {}", e);
        }
        Ok(())
    }
}

/// Handlers that forward every notice into `tx`
pub fn notice_forwarder(tx: mpsc::UnboundedSender<Notice>) -> SessionHandlers {
    let message_tx = tx.clone();
    let peers_tx = tx.clone();
    SessionHandlers::new()
        .on_message_received(move |text| {
            let _ = message_tx.send(Notice::MessageReceived(text.to_string()));
        })
        .on_peer_list_ready(move |peers| {
            let _ = peers_tx.send(Notice::PeerListReady(peers.to_vec()));
        })
        .on_status(move |status| {
            let _ = tx.send(Notice::Status(status.clone()));
        })
}
