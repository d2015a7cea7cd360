//! Collaborator callbacks
//!
//! The presentation layer registers plain closures; they are invoked
//! synchronously on the session's dispatch context, one notice at a time.

use std::fmt;

use crate::event::{Notice, StatusNotice};
use crate::peer::PeerDevice;

pub type MessageHandler = Box<dyn FnMut(&str) + Send>;
pub type PeerListHandler = Box<dyn FnMut(&[PeerDevice]) + Send>;
pub type StatusHandler = Box<dyn FnMut(&StatusNotice) + Send>;

/// Registered receivers for session notices. Unset handlers drop the notice.
#[derive(Default)]
pub struct SessionHandlers {
    on_message_received: Option<MessageHandler>,
    on_peer_list_ready: Option<PeerListHandler>,
    on_status: Option<StatusHandler>,
}

impl SessionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per accepted inbound message
    pub fn on_message_received(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_message_received = Some(Box::new(handler));
        self
    }

    /// Called once per completed scan that found at least one peer
    pub fn on_peer_list_ready(
        mut self,
        handler: impl FnMut(&[PeerDevice]) + Send + 'static,
    ) -> Self {
        self.on_peer_list_ready = Some(Box::new(handler));
        self
    }

    /// Called for every human-readable state or error notice
    pub fn on_status(mut self, handler: impl FnMut(&StatusNotice) + Send + 'static) -> Self {
        self.on_status = Some(Box::new(handler));
        self
    }

    pub fn dispatch(&mut self, notice: &Notice) {
        match notice {
            Notice::MessageReceived(text) => {
                if let Some(handler) = self.on_message_received.as_mut() {
                    handler(text);
                }
            }
            Notice::PeerListReady(peers) => {
                if let Some(handler) = self.on_peer_list_ready.as_mut() {
                    handler(peers);
                }
            }
            Notice::Status(status) => {
                if let Some(handler) = self.on_status.as_mut() {
                    handler(status);
                }
            }
        }
    }
}

impl fmt::Debug for SessionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandlers")
            .field("on_message_received", &self.on_message_received.is_some())
            .field("on_peer_list_ready", &self.on_peer_list_ready.is_some())
            .field("on_status", &self.on_status.is_some())
            .finish()
    }
}
