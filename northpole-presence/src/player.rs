//! Per-participant state held in the local view.

use std::time::Instant;

use crate::protocol::{MovePayload, ParticipantId};

/// 2D position in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A chat bubble shown above an avatar until `expires_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub expires_at: Instant,
}

/// One participant as seen by this process.
///
/// Exactly one instance is local (mutated only by the controller); all
/// others are remote and mutated only by the reconciler.
///
/// Equality compares what a peer sent, not when it arrived: `last_heard`
/// is bookkeeping and is ignored.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: ParticipantId,
    pub display_name: String,
    pub avatar_glyph: String,
    pub score: u64,
    pub position: Vec2,
    pub utterance: Option<Utterance>,
    pub is_local: bool,
    last_heard: Instant,
}

impl PartialEq for PlayerState {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.display_name == other.display_name
            && self.avatar_glyph == other.avatar_glyph
            && self.score == other.score
            && self.position == other.position
            && self.utterance == other.utterance
            && self.is_local == other.is_local
    }
}

impl PlayerState {
    /// The local player at its spawn point.
    pub fn local(
        id: ParticipantId,
        display_name: impl Into<String>,
        avatar_glyph: impl Into<String>,
        position: Vec2,
        now: Instant,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            avatar_glyph: avatar_glyph.into(),
            score: 0,
            position,
            utterance: None,
            is_local: true,
            last_heard: now,
        }
    }

    /// A remote player first seen through a `move` snapshot.
    pub fn from_move(sender: ParticipantId, payload: &MovePayload, now: Instant) -> Self {
        Self {
            id: sender,
            display_name: payload.display_name.clone(),
            avatar_glyph: payload.avatar_glyph.clone(),
            score: payload.score,
            position: Vec2::new(payload.x, payload.y),
            utterance: None,
            is_local: false,
            last_heard: now,
        }
    }

    /// Overwrite every movement-relevant field. The id is never touched.
    pub fn apply_move(&mut self, payload: &MovePayload, now: Instant) {
        self.display_name.clone_from(&payload.display_name);
        self.avatar_glyph.clone_from(&payload.avatar_glyph);
        self.score = payload.score;
        self.position = Vec2::new(payload.x, payload.y);
        self.last_heard = now;
    }

    pub fn set_score(&mut self, score: u64, now: Instant) {
        self.score = score;
        self.last_heard = now;
    }

    pub fn set_utterance(&mut self, text: impl Into<String>, expires_at: Instant) {
        self.utterance = Some(Utterance {
            text: text.into(),
            expires_at,
        });
    }

    /// Clear the utterance once `now` is past its expiry. Returns whether
    /// anything was cleared.
    pub fn expire_utterance(&mut self, now: Instant) -> bool {
        match &self.utterance {
            Some(u) if now > u.expires_at => {
                self.utterance = None;
                true
            }
            _ => false,
        }
    }

    pub fn utterance_text(&self) -> Option<&str> {
        self.utterance.as_ref().map(|u| u.text.as_str())
    }

    /// Local arrival time of the last message that touched this state.
    pub fn last_heard(&self) -> Instant {
        self.last_heard
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_heard = now;
    }

    /// Full snapshot for the `move` action.
    pub fn to_move_payload(&self) -> MovePayload {
        MovePayload {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            avatar_glyph: self.avatar_glyph.clone(),
            score: self.score,
            x: self.position.x,
            y: self.position.y,
        }
    }
}
