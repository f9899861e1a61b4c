//! Wire payloads for the three presence actions.
//!
//! Every action is an independent broadcast stream; payloads are
//! bincode-encoded (serde integration, standard config):
//! ```text
//! ┌────────┬──────────────────────────────────────────────────────┐
//! │ action │ payload                                              │
//! ├────────┼──────────────────────────────────────────────────────┤
//! │ move   │ id · display_name · avatar_glyph · score · x · y     │
//! │ chat   │ id · sender_id · sender_name · text · timestamp      │
//! │ score  │ id · score                                           │
//! └────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! `move` is always a full snapshot of the sender's movement-relevant
//! fields, never a delta. `chat` events are immutable and carry their own id.

use bincode::config::Config;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Longest chat text accepted from the network, in characters.
pub const MAX_CHAT_LEN: usize = 500;

/// Upper bound on one encoded payload. A maximal chat line is at most
/// `4 * MAX_CHAT_LEN` bytes of UTF-8; ids, names and varint prefixes fit
/// comfortably in the rest. Length prefixes beyond this are rejected before
/// anything is allocated.
pub const MAX_FRAME_BYTES: usize = 4096;

fn wire_config() -> impl Config {
    bincode::config::standard().with_limit::<MAX_FRAME_BYTES>()
}

/// Transport-assigned identity of one participant.
///
/// Unique per connection and stable for the session; a rejoin yields a new id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id, as handed out by the in-process mesh.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Named broadcast actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Move,
    Chat,
    Score,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Move, Action::Chat, Action::Score];

    /// Name used on the wire by mesh transports.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Move => "move",
            Action::Chat => "chat",
            Action::Score => "score",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ProtocolError> {
        match name {
            "move" => Ok(Action::Move),
            "chat" => Ok(Action::Chat),
            "score" => Ok(Action::Score),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Full movement snapshot of the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovePayload {
    pub id: ParticipantId,
    pub display_name: String,
    pub avatar_glyph: String,
    pub score: u64,
    pub x: f32,
    pub y: f32,
}

impl MovePayload {
    /// Check required fields against the transport-reported sender.
    pub fn validate(&self, sender: &ParticipantId) -> Result<(), ProtocolError> {
        if self.id.is_empty() {
            return Err(ProtocolError::Invalid("move: empty id".into()));
        }
        if &self.id != sender {
            return Err(ProtocolError::Invalid(format!(
                "move: id {} does not match sender {sender}",
                self.id
            )));
        }
        if self.display_name.is_empty() {
            return Err(ProtocolError::Invalid("move: empty display name".into()));
        }
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(ProtocolError::Invalid("move: non-finite position".into()));
        }
        Ok(())
    }
}

/// One chat line. Never mutated once sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub id: String,
    pub sender_id: ParticipantId,
    pub sender_name: String,
    pub text: String,
    /// Milliseconds since the UNIX epoch at the sender.
    pub timestamp: u64,
}

impl ChatPayload {
    /// Stamp a new chat event with a fresh id and the current wall clock.
    pub fn new(
        sender_id: ParticipantId,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id,
            sender_name: sender_name.into(),
            text: text.into(),
            timestamp: unix_millis(),
        }
    }

    pub fn validate(&self, sender: &ParticipantId) -> Result<(), ProtocolError> {
        if self.id.is_empty() {
            return Err(ProtocolError::Invalid("chat: empty id".into()));
        }
        if &self.sender_id != sender {
            return Err(ProtocolError::Invalid(format!(
                "chat: sender_id {} does not match sender {sender}",
                self.sender_id
            )));
        }
        if self.text.is_empty() {
            return Err(ProtocolError::Invalid("chat: empty text".into()));
        }
        if self.text.chars().count() > MAX_CHAT_LEN {
            return Err(ProtocolError::Invalid(format!(
                "chat: text longer than {MAX_CHAT_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Narrow score update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePayload {
    pub id: ParticipantId,
    pub score: u64,
}

impl ScorePayload {
    pub fn validate(&self, sender: &ParticipantId) -> Result<(), ProtocolError> {
        if &self.id != sender {
            return Err(ProtocolError::Invalid(format!(
                "score: id {} does not match sender {sender}",
                self.id
            )));
        }
        Ok(())
    }
}

/// Serialize a payload to its binary wire form.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(payload, wire_config())
        .map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Deserialize a payload, rejecting trailing bytes.
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::Deserialization(format!(
            "frame of {} bytes exceeds {MAX_FRAME_BYTES}",
            bytes.len()
        )));
    }
    let (payload, read) = bincode::serde::decode_from_slice(bytes, wire_config())
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    if read != bytes.len() {
        return Err(ProtocolError::Deserialization(format!(
            "{} trailing bytes",
            bytes.len() - read
        )));
    }
    Ok(payload)
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Protocol errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Invalid payload: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_move(id: &str) -> MovePayload {
        MovePayload {
            id: ParticipantId::from(id),
            display_name: "ElfTwinkle".into(),
            avatar_glyph: "🧝".into(),
            score: 8500,
            x: 400.0,
            y: 300.0,
        }
    }

    #[test]
    fn test_move_roundtrip() {
        let msg = sample_move("a");
        let encoded = encode_payload(&msg).unwrap();
        let decoded: MovePayload = decode_payload(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_chat_new_stamps_id_and_time() {
        let a = ChatPayload::new(ParticipantId::from("a"), "Alice", "hi");
        let b = ChatPayload::new(ParticipantId::from("a"), "Alice", "hi");
        assert_ne!(a.id, b.id);
        assert!(a.timestamp > 0);
    }

    #[test]
    fn test_move_message_size_small() {
        let encoded = encode_payload(&sample_move("4f1c2a9e")).unwrap();
        assert!(encoded.len() < 64, "move payload too large: {} bytes", encoded.len());
    }

    #[test]
    fn test_decode_garbage() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert!(decode_payload::<MovePayload>(&garbage).is_err());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut encoded = encode_payload(&ScorePayload { id: "a".into(), score: 3 }).unwrap();
        encoded.push(0);
        let err = decode_payload::<ScorePayload>(&encoded).unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_decode_rejects_huge_length_prefix() {
        // Varint tag 253 announces a u64 length; u64::MAX must not allocate.
        let mut frame = vec![253];
        frame.extend_from_slice(&u64::MAX.to_le_bytes());
        let err = decode_payload::<MovePayload>(&frame).unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_largest_chat_fits_frame_limit() {
        let sender = ParticipantId::generate();
        let line = ChatPayload::new(sender, "N".repeat(64), "🎄".repeat(MAX_CHAT_LEN));
        let encoded = encode_payload(&line).unwrap();
        assert!(encoded.len() <= MAX_FRAME_BYTES);
        assert_eq!(decode_payload::<ChatPayload>(&encoded).unwrap(), line);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let frame = vec![0u8; MAX_FRAME_BYTES + 1];
        assert!(decode_payload::<ScorePayload>(&frame).is_err());
    }

    #[test]
    fn test_action_names() {
        for action in Action::ALL {
            assert_eq!(Action::from_name(action.name()).unwrap(), action);
        }
        assert_eq!(
            Action::from_name("egg"),
            Err(ProtocolError::UnknownAction("egg".into()))
        );
    }

    #[test]
    fn test_move_validation() {
        let sender = ParticipantId::from("a");
        assert!(sample_move("a").validate(&sender).is_ok());
        assert!(sample_move("b").validate(&sender).is_err());

        let mut nameless = sample_move("a");
        nameless.display_name.clear();
        assert!(nameless.validate(&sender).is_err());

        let mut nan = sample_move("a");
        nan.x = f32::NAN;
        assert!(nan.validate(&sender).is_err());
    }

    #[test]
    fn test_chat_validation() {
        let sender = ParticipantId::from("a");
        let ok = ChatPayload::new(sender.clone(), "Alice", "Merry!");
        assert!(ok.validate(&sender).is_ok());
        assert!(ok.validate(&ParticipantId::from("b")).is_err());

        let empty = ChatPayload::new(sender.clone(), "Alice", "");
        assert!(empty.validate(&sender).is_err());

        let long = ChatPayload::new(sender.clone(), "Alice", "x".repeat(MAX_CHAT_LEN + 1));
        assert!(long.validate(&sender).is_err());
    }

    #[test]
    fn test_score_validation() {
        let payload = ScorePayload { id: "a".into(), score: 30 };
        assert!(payload.validate(&"a".into()).is_ok());
        assert!(payload.validate(&"b".into()).is_err());
    }

    #[test]
    fn test_participant_id_generate_unique() {
        let a = ParticipantId::generate();
        let b = ParticipantId::generate();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }
}
