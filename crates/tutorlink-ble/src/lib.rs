//! Bluetooth Low Energy runtime for the tutor session protocol
//!
//! This crate connects the sans-I/O session in `tutorlink-core` to a real
//! adapter through btleplug, and runs it on a single tokio task.
//!
//! ## Architecture
//!
//! - [`config`] - Transport configuration and timeouts
//! - [`error`] - Error types specific to the BLE transport
//! - [`discovery`] - Adapter setup, scanning and adapter events
//! - [`connection`] - Connection management and characteristic I/O
//! - [`transport`] - The [`GattTransport`] seam and its btleplug implementation
//! - [`driver`] - [`SessionDriver`] and the caller-side [`SessionHandle`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tokio::sync::mpsc;
//! use tutorlink_ble::{BleTransportConfig, BtleplugTransport, SessionDriver};
//! use tutorlink_core::{SessionConfig, SessionHandlers};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (events_tx, events_rx) = mpsc::unbounded_channel();
//! let transport = BtleplugTransport::new(BleTransportConfig::default(), events_tx).await?;
//!
//! let handlers = SessionHandlers::new()
//!     .on_message_received(|text| println!("tutor: {}", text))
//!     .on_status(|status| println!("{}", status));
//! let (driver, session) =
//!     SessionDriver::new(SessionConfig::default(), transport, events_rx, handlers)?;
//! tokio::spawn(driver.run());
//!
//! session.connect("24:0A:C4:12:34:56").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod transport;

// Public API exports
pub use config::BleTransportConfig;
pub use connection::BleConnection;
pub use discovery::BleDiscovery;
pub use driver::{SessionDriver, SessionHandle};
pub use error::{BleTransportError, Result};
pub use transport::{BtleplugTransport, EventSender, GattTransport, LinkEpoch, LinkEvent};
