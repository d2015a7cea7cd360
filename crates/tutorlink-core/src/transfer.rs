//! Chunked, acknowledgement-gated message transfer
//!
//! Outbound text is terminated with `$` and cut into chunks of at most
//! `max_chunk_len` bytes. Exactly one chunk is in flight at a time: after a
//! chunk is written the peer answers with an empty notification once it has
//! consumed it, and that notification drives the next chunk.
//!
//! The write-complete and notify events for back-to-back operations can be
//! delivered in either order. The write-ack flag is cleared when a chunk is
//! written and set again by its write-complete. Notifications are only
//! protocol-relevant while it is set: an empty one seen before the
//! write-complete is held until the write settles, anything else is stale and
//! dropped.

use tracing::{debug, error, warn};

use crate::config::InboundPolicy;
use crate::connection_state::CharacteristicHandle;
use crate::error::{Result, SessionError};
use crate::event::{Effect, Notice, StatusNotice, TransportCommand};
use crate::protocol::{GattStatus, MESSAGE_TERMINATOR};

/// Upper bound on a partially reassembled inbound message
pub const MAX_INBOUND_MESSAGE_LEN: usize = 64 * 1024;

// ----------------------------------------------------------------------------
// Outbound Buffer
// ----------------------------------------------------------------------------

/// A terminated outbound payload and how much of it has been handed out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessageBuffer {
    payload: Vec<u8>,
    cursor: usize,
}

impl OutboundMessageBuffer {
    /// Buffer `text` followed by the message terminator
    pub fn new(text: &str) -> Self {
        let mut payload = Vec::with_capacity(text.len() + MESSAGE_TERMINATOR.len_utf8());
        payload.extend_from_slice(text.as_bytes());
        let mut terminator = [0u8; 4];
        payload.extend_from_slice(MESSAGE_TERMINATOR.encode_utf8(&mut terminator).as_bytes());
        Self { payload, cursor: 0 }
    }

    /// Hand out the next chunk of at most `max_len` bytes and advance the cursor
    pub fn take_chunk(&mut self, max_len: usize) -> Vec<u8> {
        let end = self.payload.len().min(self.cursor + max_len.max(1));
        let chunk = self.payload[self.cursor..end].to_vec();
        self.cursor = end;
        chunk
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.cursor
    }

    pub fn is_drained(&self) -> bool {
        self.remaining() == 0
    }
}

/// Split `text` into the exact sequence of chunks the protocol transmits
pub fn chunk_message(text: &str, max_len: usize) -> Vec<Vec<u8>> {
    let mut buffer = OutboundMessageBuffer::new(text);
    let mut chunks = Vec::new();
    while !buffer.is_drained() {
        chunks.push(buffer.take_chunk(max_len));
    }
    chunks
}

// ----------------------------------------------------------------------------
// Inbound Assembly
// ----------------------------------------------------------------------------

/// Turns accepted notification payloads into delivered messages
#[derive(Debug, Clone)]
pub struct InboundAssembler {
    policy: InboundPolicy,
    pending: Vec<u8>,
}

impl InboundAssembler {
    pub fn new(policy: InboundPolicy) -> Self {
        Self {
            policy,
            pending: Vec::new(),
        }
    }

    /// Feed one non-empty payload; returns a message once one is complete
    pub fn accept(&mut self, payload: &[u8]) -> Option<String> {
        match self.policy {
            InboundPolicy::PerNotification => Some(String::from_utf8_lossy(payload).into_owned()),
            InboundPolicy::SentinelTerminated => {
                if self.pending.len() + payload.len() > MAX_INBOUND_MESSAGE_LEN {
                    warn!(
                        "Inbound message exceeds {} bytes without terminator, dropping",
                        MAX_INBOUND_MESSAGE_LEN
                    );
                    self.pending.clear();
                    return None;
                }
                self.pending.extend_from_slice(payload);

                let terminator = MESSAGE_TERMINATOR as u8;
                if self.pending.last() != Some(&terminator) {
                    debug!("Buffered {} inbound bytes", self.pending.len());
                    return None;
                }
                let mut message = std::mem::take(&mut self.pending);
                message.pop();
                Some(String::from_utf8_lossy(&message).into_owned())
            }
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

// ----------------------------------------------------------------------------
// Transfer Protocol
// ----------------------------------------------------------------------------

/// Outbound chunk scheduling and inbound notification handling
#[derive(Debug)]
pub struct TransferProtocol {
    max_chunk_len: usize,
    outbound: Option<OutboundMessageBuffer>,
    /// The write-ack flag; starts set while idle
    write_acked: bool,
    /// A ready-for-next notification arrived before the write it follows completed
    drive_pending: bool,
    inbound: InboundAssembler,
}

impl TransferProtocol {
    pub fn new(max_chunk_len: usize, policy: InboundPolicy) -> Self {
        Self {
            max_chunk_len,
            outbound: None,
            write_acked: true,
            drive_pending: false,
            inbound: InboundAssembler::new(policy),
        }
    }

    pub fn outbound(&self) -> Option<&OutboundMessageBuffer> {
        self.outbound.as_ref()
    }

    pub fn write_acked(&self) -> bool {
        self.write_acked
    }

    /// `true` while a message is being transmitted or a chunk awaits completion
    pub fn is_busy(&self) -> bool {
        self.outbound.is_some() || !self.write_acked
    }

    /// Start transmitting `text`. The caller guarantees the link is ready.
    pub fn send(&mut self, text: &str, handle: &CharacteristicHandle) -> Result<Vec<Effect>> {
        if self.is_busy() {
            debug!("Rejecting send, a message is still in flight");
            return Err(SessionError::MessageInFlight);
        }

        self.outbound = Some(OutboundMessageBuffer::new(text));
        debug!("Queued outbound message of {} bytes", text.len() + 1);
        Ok(self.transmit_next(handle))
    }

    pub fn on_write_complete(
        &mut self,
        status: GattStatus,
        handle: Option<&CharacteristicHandle>,
    ) -> Vec<Effect> {
        if self.write_acked {
            warn!("Write completion without an outstanding write");
        }
        self.write_acked = true;

        match status {
            GattStatus::Failure { reason } => {
                error!("Characteristic write failed: {}", reason);
                if self.outbound.take().is_some() {
                    debug!("Abandoning the rest of the outbound message");
                }
                self.drive_pending = false;
                vec![Effect::status(StatusNotice::TransmissionFailed { reason })]
            }
            GattStatus::Success => {
                if !std::mem::take(&mut self.drive_pending) {
                    return Vec::new();
                }
                match handle {
                    Some(handle) => self.transmit_next(handle),
                    None => Vec::new(),
                }
            }
        }
    }

    pub fn on_characteristic_changed(
        &mut self,
        value: &[u8],
        handle: Option<&CharacteristicHandle>,
    ) -> Vec<Effect> {
        if !self.write_acked {
            if value.is_empty() && self.outbound.is_some() {
                debug!("Peer ready before write completion, deferring next chunk");
                self.drive_pending = true;
            } else {
                warn!(
                    "Discarding notification racing its write completion ({} bytes)",
                    value.len()
                );
            }
            return Vec::new();
        }

        if value.is_empty() {
            return self.on_peer_ready(handle);
        }

        debug!("Notification: {}", hex::encode(value));
        match self.inbound.accept(value) {
            Some(text) => vec![Effect::Notify(Notice::MessageReceived(text))],
            None => Vec::new(),
        }
    }

    /// Drop any in-flight message and return to idle
    pub fn reset(&mut self) {
        if self.outbound.take().is_some() {
            debug!("Dropping unsent outbound message");
        }
        self.write_acked = true;
        self.drive_pending = false;
        self.inbound.clear();
    }

    fn on_peer_ready(&mut self, handle: Option<&CharacteristicHandle>) -> Vec<Effect> {
        if self.outbound.is_none() {
            debug!("Peer ready, nothing left to send");
            return Vec::new();
        }
        match handle {
            Some(handle) => self.transmit_next(handle),
            None => Vec::new(),
        }
    }

    fn transmit_next(&mut self, handle: &CharacteristicHandle) -> Vec<Effect> {
        let Some(buffer) = self.outbound.as_mut() else {
            return Vec::new();
        };

        let chunk = buffer.take_chunk(self.max_chunk_len);
        let remaining = buffer.remaining();
        if buffer.is_drained() {
            self.outbound = None;
        }
        self.write_acked = false;
        debug!(
            "Writing chunk of {} bytes, {} remaining",
            chunk.len(),
            remaining
        );

        vec![Effect::Transport(TransportCommand::WriteCharacteristic {
            handle: handle.clone(),
            value: chunk,
            mode: handle.write_mode,
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        WriteMode, CLIENT_CONFIG_DESCRIPTOR_UUID, TUTOR_CHARACTERISTIC_UUID, TUTOR_SERVICE_UUID,
    };

    fn handle() -> CharacteristicHandle {
        CharacteristicHandle {
            service: TUTOR_SERVICE_UUID,
            characteristic: TUTOR_CHARACTERISTIC_UUID,
            descriptor: CLIENT_CONFIG_DESCRIPTOR_UUID,
            write_mode: WriteMode::WithResponse,
        }
    }

    fn written(effects: &[Effect]) -> Vec<Vec<u8>> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Transport(TransportCommand::WriteCharacteristic { value, .. }) => {
                    Some(value.clone())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_chunk_message_sizes() {
        let text = "a".repeat(649);
        let sizes: Vec<_> = chunk_message(&text, 300).iter().map(Vec::len).collect();
        assert_eq!(sizes, [300, 300, 50]);

        assert_eq!(chunk_message("", 300), vec![b"$".to_vec()]);
        assert_eq!(chunk_message("ab", 1), vec![b"a".to_vec(), b"b".to_vec(), b"$".to_vec()]);
    }

    #[test]
    fn test_short_message_is_single_chunk() {
        let mut protocol = TransferProtocol::new(300, InboundPolicy::PerNotification);
        let effects = protocol.send("Hello", &handle()).unwrap();
        assert_eq!(written(&effects), vec![b"Hello$".to_vec()]);
        assert!(protocol.outbound().is_none());

        assert!(protocol.on_write_complete(GattStatus::Success, Some(&handle())).is_empty());
        assert!(protocol.on_characteristic_changed(b"", Some(&handle())).is_empty());
        assert!(!protocol.is_busy());
    }

    #[test]
    fn test_idle_notifications_are_delivered() {
        let mut protocol = TransferProtocol::new(300, InboundPolicy::PerNotification);
        assert!(protocol.write_acked());
        for text in ["Play A minor", "Again"] {
            assert_eq!(
                protocol.on_characteristic_changed(text.as_bytes(), Some(&handle())),
                vec![Effect::Notify(Notice::MessageReceived(text.into()))]
            );
        }
        assert!(protocol.write_acked());
    }

    #[test]
    fn test_one_ready_notification_per_chunk() {
        let mut protocol = TransferProtocol::new(300, InboundPolicy::PerNotification);
        let mut sizes: Vec<usize> = written(&protocol.send(&"x".repeat(649), &handle()).unwrap())
            .iter()
            .map(Vec::len)
            .collect();

        while protocol.is_busy() {
            assert!(!protocol.write_acked());
            assert!(protocol.on_write_complete(GattStatus::Success, Some(&handle())).is_empty());
            assert!(protocol.write_acked());
            let effects = protocol.on_characteristic_changed(b"", Some(&handle()));
            sizes.extend(written(&effects).iter().map(Vec::len));
        }
        assert_eq!(sizes, [300, 300, 50]);
    }

    #[test]
    fn test_data_before_write_complete_is_discarded() {
        let mut protocol = TransferProtocol::new(2, InboundPolicy::PerNotification);
        protocol.send("abcdef", &handle()).unwrap();
        let remaining = protocol.outbound().map(|b| b.remaining());

        assert!(protocol.on_characteristic_changed(b"late", Some(&handle())).is_empty());
        assert_eq!(protocol.outbound().map(|b| b.remaining()), remaining);
        assert!(protocol.on_write_complete(GattStatus::Success, Some(&handle())).is_empty());
    }

    #[test]
    fn test_second_send_while_in_flight_is_rejected() {
        let mut protocol = TransferProtocol::new(4, InboundPolicy::PerNotification);
        protocol.send("abcdefgh", &handle()).unwrap();
        assert_eq!(
            protocol.send("other", &handle()),
            Err(SessionError::MessageInFlight)
        );
        assert_eq!(protocol.outbound().map(|b| b.remaining()), Some(5));
    }

    #[test]
    fn test_send_rejected_until_last_chunk_completes() {
        let mut protocol = TransferProtocol::new(300, InboundPolicy::PerNotification);
        protocol.send("Hi", &handle()).unwrap();
        assert!(protocol.outbound().is_none());
        assert_eq!(protocol.send("again", &handle()), Err(SessionError::MessageInFlight));

        protocol.on_write_complete(GattStatus::Success, Some(&handle()));
        assert!(protocol.send("again", &handle()).is_ok());
    }

    #[test]
    fn test_ready_before_write_complete_defers_next_chunk() {
        let mut protocol = TransferProtocol::new(2, InboundPolicy::PerNotification);
        let effects = protocol.send("abc", &handle()).unwrap();
        assert_eq!(written(&effects), vec![b"ab".to_vec()]);

        // Peer's ready signal overtakes the write completion
        assert!(protocol.on_characteristic_changed(b"", Some(&handle())).is_empty());
        let effects = protocol.on_write_complete(GattStatus::Success, Some(&handle()));
        assert_eq!(written(&effects), vec![b"c$".to_vec()]);
    }

    #[test]
    fn test_write_failure_abandons_message() {
        let mut protocol = TransferProtocol::new(2, InboundPolicy::PerNotification);
        protocol.send("abcdef", &handle()).unwrap();

        let effects = protocol.on_write_complete(GattStatus::failure("busy"), Some(&handle()));
        assert_eq!(
            effects,
            vec![Effect::status(StatusNotice::TransmissionFailed {
                reason: "busy".into()
            })]
        );
        assert!(!protocol.is_busy());
        assert!(protocol.on_characteristic_changed(b"", Some(&handle())).is_empty());
    }

    #[test]
    fn test_reset_restores_idle_gate() {
        let mut protocol = TransferProtocol::new(2, InboundPolicy::PerNotification);
        protocol.send("abcdef", &handle()).unwrap();
        protocol.reset();
        assert!(protocol.outbound().is_none());
        assert!(protocol.write_acked());
        assert!(!protocol.is_busy());
    }

    #[test]
    fn test_sentinel_reassembly() {
        let mut assembler = InboundAssembler::new(InboundPolicy::SentinelTerminated);
        assert_eq!(assembler.accept(b"E4 G"), None);
        assert_eq!(assembler.accept(b"3 B3"), None);
        assert_eq!(assembler.accept(b"$"), Some("E4 G3 B3".to_string()));
        assert_eq!(assembler.accept(b"D4$"), Some("D4".to_string()));
    }

    #[test]
    fn test_sentinel_reassembly_drops_oversized_message() {
        let mut assembler = InboundAssembler::new(InboundPolicy::SentinelTerminated);
        let big = vec![b'x'; MAX_INBOUND_MESSAGE_LEN];
        assert_eq!(assembler.accept(&big), None);
        assert_eq!(assembler.accept(b"yy"), None);
        assert_eq!(assembler.accept(b"ok$"), Some("ok".to_string()));
    }

    #[test]
    fn test_per_notification_decodes_lossily() {
        let mut assembler = InboundAssembler::new(InboundPolicy::PerNotification);
        assert_eq!(assembler.accept(&[0x68, 0xFF]), Some("h\u{FFFD}".to_string()));
    }
}
