//! Presence channel: the `move`, `chat` and `score` streams over a transport.
//!
//! Outbound, payloads are encoded and handed to the transport
//! fire-and-forget. Inbound, raw [`TransportEvent`]s are decoded and
//! validated into [`PresenceEvent`]s; anything malformed is logged and
//! dropped so the event loop never sees it.
//!
//! Sends made before a transport is attached are dropped silently.
//! Movement is superseded by the next snapshot anyway, so nothing is queued.

use serde::Serialize;

use crate::protocol::{
    decode_payload, encode_payload, Action, ChatPayload, MovePayload, ParticipantId,
    ProtocolError, ScorePayload,
};
use crate::transport::{Transport, TransportEvent};

/// Decoded inbound event, one per transport notification.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    PeerJoined(ParticipantId),
    PeerLeft(ParticipantId),
    MoveReceived {
        from: ParticipantId,
        payload: MovePayload,
    },
    ChatReceived {
        from: ParticipantId,
        payload: ChatPayload,
    },
    ScoreReceived {
        from: ParticipantId,
        payload: ScorePayload,
    },
}

/// Result of a fire-and-forget send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Dropped,
}

/// Counters for monitoring channel health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub sent: u64,
    /// Sends attempted before a transport was attached
    pub dropped_unavailable: u64,
    /// Sends the transport refused (closed, or payload failed to encode)
    pub dropped_send_failed: u64,
    pub received: u64,
    /// Inbound frames dropped as malformed
    pub rejected: u64,
}

pub struct PresenceChannel<T> {
    transport: Option<T>,
    stats: ChannelStats,
}

impl<T: Transport> PresenceChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            stats: ChannelStats::default(),
        }
    }

    /// A channel with no transport yet; every send is dropped.
    pub fn unattached() -> Self {
        Self {
            transport: None,
            stats: ChannelStats::default(),
        }
    }

    pub fn attach(&mut self, transport: T) {
        self.transport = Some(transport);
    }

    /// Release the transport (and with it the room membership).
    pub fn detach(&mut self) -> Option<T> {
        self.transport.take()
    }

    pub fn is_attached(&self) -> bool {
        self.transport.is_some()
    }

    pub fn local_id(&self) -> Option<&ParticipantId> {
        self.transport.as_ref().map(|t| t.local_id())
    }

    pub fn send_move(&mut self, payload: &MovePayload) -> SendOutcome {
        self.send(Action::Move, payload)
    }

    pub fn send_chat(&mut self, payload: &ChatPayload) -> SendOutcome {
        self.send(Action::Chat, payload)
    }

    pub fn send_score(&mut self, payload: &ScorePayload) -> SendOutcome {
        self.send(Action::Score, payload)
    }

    fn send<P: Serialize>(&mut self, action: Action, payload: &P) -> SendOutcome {
        let Some(transport) = &self.transport else {
            self.stats.dropped_unavailable += 1;
            log::debug!("Dropping {action} broadcast: transport not attached");
            return SendOutcome::Dropped;
        };

        let result = encode_payload(payload)
            .map_err(|e| e.to_string())
            .and_then(|bytes| transport.send(action, bytes).map_err(|e| e.to_string()));

        match result {
            Ok(()) => {
                self.stats.sent += 1;
                SendOutcome::Sent
            }
            Err(e) => {
                self.stats.dropped_send_failed += 1;
                log::debug!("Dropping {action} broadcast: {e}");
                SendOutcome::Dropped
            }
        }
    }

    /// Turn a transport notification into a presence event.
    ///
    /// Returns `None` for frames that fail to decode or validate.
    pub fn decode(&mut self, event: TransportEvent) -> Option<PresenceEvent> {
        let (action, from, payload) = match event {
            TransportEvent::PeerJoined(id) => return Some(PresenceEvent::PeerJoined(id)),
            TransportEvent::PeerLeft(id) => return Some(PresenceEvent::PeerLeft(id)),
            TransportEvent::Message { action, from, payload } => (action, from, payload),
        };
        self.stats.received += 1;

        match Self::decode_message(action, from.clone(), &payload) {
            Ok(event) => Some(event),
            Err(e) => {
                self.stats.rejected += 1;
                log::warn!("Rejected {action} frame from {from}: {e}");
                None
            }
        }
    }

    fn decode_message(
        action: Action,
        from: ParticipantId,
        bytes: &[u8],
    ) -> Result<PresenceEvent, ProtocolError> {
        match action {
            Action::Move => {
                let payload: MovePayload = decode_payload(bytes)?;
                payload.validate(&from)?;
                Ok(PresenceEvent::MoveReceived { from, payload })
            }
            Action::Chat => {
                let payload: ChatPayload = decode_payload(bytes)?;
                payload.validate(&from)?;
                Ok(PresenceEvent::ChatReceived { from, payload })
            }
            Action::Score => {
                let payload: ScorePayload = decode_payload(bytes)?;
                payload.validate(&from)?;
                Ok(PresenceEvent::ScoreReceived { from, payload })
            }
        }
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::TransportError;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    /// Transport that records every send instead of delivering it.
    #[derive(Clone)]
    pub(crate) struct RecordingTransport {
        pub id: ParticipantId,
        pub sent: Rc<RefCell<Vec<(Action, Vec<u8>)>>>,
        pub closed: bool,
    }

    impl RecordingTransport {
        pub fn new(id: &str) -> Self {
            Self {
                id: id.into(),
                sent: Rc::new(RefCell::new(Vec::new())),
                closed: false,
            }
        }

        pub fn actions(&self) -> Vec<Action> {
            self.sent.borrow().iter().map(|(a, _)| *a).collect()
        }
    }

    impl Transport for RecordingTransport {
        fn local_id(&self) -> &ParticipantId {
            &self.id
        }

        fn send(&self, action: Action, payload: Vec<u8>) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::Closed);
            }
            self.sent.borrow_mut().push((action, payload));
            Ok(())
        }
    }

    fn frame<P: Serialize>(action: Action, from: &str, payload: &P) -> TransportEvent {
        TransportEvent::Message {
            action,
            from: from.into(),
            payload: Arc::new(encode_payload(payload).unwrap()),
        }
    }

    fn move_payload(id: &str) -> MovePayload {
        MovePayload {
            id: id.into(),
            display_name: "FrostyFan".into(),
            avatar_glyph: "⛄".into(),
            score: 4500,
            x: 200.0,
            y: 800.0,
        }
    }

    #[test]
    fn test_send_without_transport_is_dropped() {
        let mut channel: PresenceChannel<RecordingTransport> = PresenceChannel::unattached();
        assert_eq!(channel.send_move(&move_payload("a")), SendOutcome::Dropped);
        assert_eq!(channel.stats().dropped_unavailable, 1);
        assert!(channel.local_id().is_none());
    }

    #[test]
    fn test_send_uses_action_streams() {
        let transport = RecordingTransport::new("a");
        let mut channel = PresenceChannel::new(transport.clone());

        channel.send_move(&move_payload("a"));
        channel.send_score(&ScorePayload { id: "a".into(), score: 1 });
        channel.send_chat(&ChatPayload::new("a".into(), "FrostyFan", "hi"));

        assert_eq!(transport.actions(), vec![Action::Move, Action::Score, Action::Chat]);
        assert_eq!(channel.stats().sent, 3);
    }

    #[test]
    fn test_send_on_closed_transport_is_dropped() {
        let mut transport = RecordingTransport::new("a");
        transport.closed = true;
        let mut channel = PresenceChannel::new(transport);

        assert_eq!(channel.send_move(&move_payload("a")), SendOutcome::Dropped);
        assert_eq!(channel.stats().dropped_send_failed, 1);
    }

    #[test]
    fn test_attach_later() {
        let mut channel = PresenceChannel::unattached();
        channel.attach(RecordingTransport::new("a"));
        assert_eq!(channel.send_move(&move_payload("a")), SendOutcome::Sent);
        assert!(channel.detach().is_some());
        assert!(!channel.is_attached());
    }

    #[test]
    fn test_decode_move() {
        let mut channel = PresenceChannel::new(RecordingTransport::new("me"));
        let event = channel.decode(frame(Action::Move, "a", &move_payload("a")));
        assert_eq!(
            event,
            Some(PresenceEvent::MoveReceived { from: "a".into(), payload: move_payload("a") })
        );
    }

    #[test]
    fn test_decode_passes_lifecycle_events() {
        let mut channel = PresenceChannel::new(RecordingTransport::new("me"));
        assert_eq!(
            channel.decode(TransportEvent::PeerLeft("a".into())),
            Some(PresenceEvent::PeerLeft("a".into()))
        );
        assert_eq!(channel.stats().received, 0);
    }

    #[test]
    fn test_decode_rejects_spoofed_sender() {
        let mut channel = PresenceChannel::new(RecordingTransport::new("me"));
        assert!(channel.decode(frame(Action::Move, "b", &move_payload("a"))).is_none());
        assert!(channel
            .decode(frame(Action::Score, "b", &ScorePayload { id: "a".into(), score: 9 }))
            .is_none());
        assert_eq!(channel.stats().rejected, 2);
    }

    #[test]
    fn test_decode_rejects_garbage_and_wrong_stream() {
        let mut channel = PresenceChannel::new(RecordingTransport::new("me"));
        let garbage = TransportEvent::Message {
            action: Action::Chat,
            from: "a".into(),
            payload: Arc::new(vec![0xFF, 0x00, 0x13]),
        };
        assert!(channel.decode(garbage).is_none());

        // A score payload pushed into the move stream does not parse as a move.
        let crossed = frame(Action::Move, "a", &ScorePayload { id: "a".into(), score: 1 });
        assert!(channel.decode(crossed).is_none());
        assert_eq!(channel.stats().rejected, 2);
        assert_eq!(channel.stats().received, 2);
    }

    #[test]
    fn test_decode_rejects_huge_length_prefix() {
        let mut channel = PresenceChannel::new(RecordingTransport::new("me"));
        let mut bytes = vec![253];
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        let hostile = TransportEvent::Message {
            action: Action::Move,
            from: "a".into(),
            payload: Arc::new(bytes),
        };

        assert!(channel.decode(hostile).is_none());
        assert_eq!(channel.stats().rejected, 1);
    }
}
