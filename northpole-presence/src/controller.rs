//! Local player controller.
//!
//! Owns the single local [`PlayerState`]. Position changes always apply
//! locally, but a `move` snapshot is only produced once the throttle window
//! (50 ms by default) has elapsed since the previous one, which bounds the
//! outbound rate independently of how fast input is sampled.
//!
//! Score changes yield both a `score` message and a full `move` snapshot:
//! the two streams are independent and remote views may watch either one.
//!
//! Every method takes the current `Instant` so callers (and tests) control
//! the clock.

use std::time::{Duration, Instant};

use crate::config::PresenceConfig;
use crate::player::{PlayerState, Vec2};
use crate::protocol::{ChatPayload, MovePayload, ParticipantId, ScorePayload, MAX_CHAT_LEN};
use crate::world::{
    nearest_interactable, HiddenItems, Interactable, InteractableKind, Zone, HIDDEN_ITEM_POINTS,
};

/// World units moved per input sample.
pub const MOVE_SPEED: f32 = 5.0;

/// Scale applied to each axis when moving diagonally.
const DIAGONAL_FACTOR: f32 = 0.707;

/// Held direction keys for one input sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputDirection {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl InputDirection {
    pub fn new(up: bool, down: bool, left: bool, right: bool) -> Self {
        Self { up, down, left, right }
    }

    /// Displacement for one sample; opposite keys cancel out.
    pub fn delta(&self) -> Vec2 {
        let axis = |neg: bool, pos: bool| match (neg, pos) {
            (true, false) => -MOVE_SPEED,
            (false, true) => MOVE_SPEED,
            _ => 0.0,
        };
        let mut dx = axis(self.left, self.right);
        let mut dy = axis(self.up, self.down);
        if dx != 0.0 && dy != 0.0 {
            dx *= DIAGONAL_FACTOR;
            dy *= DIAGONAL_FACTOR;
        }
        Vec2::new(dx, dy)
    }
}

/// The pair of messages produced by a score change.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBroadcast {
    pub score: ScorePayload,
    pub snapshot: MovePayload,
}

pub struct LocalPlayerController {
    state: PlayerState,
    zone: Zone,
    move_interval: Duration,
    utterance_ttl: Duration,
    last_move_broadcast: Option<Instant>,
    /// Position changed since the last snapshot went out.
    pending: bool,
}

impl LocalPlayerController {
    pub fn new(id: ParticipantId, config: &PresenceConfig, now: Instant) -> Self {
        let zone = Zone::default();
        let state = PlayerState::local(
            id,
            config.display_name.clone(),
            config.avatar_glyph.clone(),
            zone.clamp(config.spawn_point()),
            now,
        );
        Self {
            state,
            zone,
            move_interval: config.move_interval(),
            utterance_ttl: config.utterance_ttl(),
            last_move_broadcast: None,
            pending: false,
        }
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Apply one sample of held direction keys.
    ///
    /// Returns a snapshot to broadcast if the player moved and the throttle
    /// window is open.
    pub fn apply_input(&mut self, input: InputDirection, now: Instant) -> Option<MovePayload> {
        let delta = input.delta();
        if delta == Vec2::ZERO {
            return None;
        }
        let target = Vec2::new(
            self.state.position.x + delta.x,
            self.state.position.y + delta.y,
        );
        self.reposition(target, now)
    }

    /// Jump to an absolute position (clamped to the zone).
    pub fn move_to(&mut self, x: f32, y: f32, now: Instant) -> Option<MovePayload> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        self.reposition(Vec2::new(x, y), now)
    }

    /// Switch zones locally. The zone is not replicated; only the clamped
    /// position travels in the next snapshot.
    pub fn enter_zone(&mut self, zone: Zone, now: Instant) -> Option<MovePayload> {
        self.zone = zone;
        self.reposition(self.state.position, now)
    }

    /// The interactable the player could use right now.
    pub fn nearby(&self) -> Option<&'static Interactable> {
        nearest_interactable(self.zone, self.state.position)
    }

    /// Use the nearest interactable in range. Portals switch zone; games
    /// and NPCs are only reported back.
    ///
    /// Returns `None` when nothing is in range, otherwise the item used and
    /// a snapshot to broadcast if a portal moved the player.
    pub fn interact(
        &mut self,
        now: Instant,
    ) -> Option<(&'static Interactable, Option<MovePayload>)> {
        let item = self.nearby()?;
        let moved = match item.kind {
            InteractableKind::Portal { target } => self.enter_zone(target, now),
            InteractableKind::Game(_) | InteractableKind::Npc { .. } => None,
        };
        Some((item, moved))
    }

    fn reposition(&mut self, target: Vec2, now: Instant) -> Option<MovePayload> {
        self.state.position = self.zone.clamp(target);
        self.pending = true;
        self.flush(now)
    }

    /// Send the position held back by the throttle, once the window opens.
    pub fn flush(&mut self, now: Instant) -> Option<MovePayload> {
        if !self.pending || !self.throttle_open(now) {
            return None;
        }
        Some(self.announce(now))
    }

    fn throttle_open(&self, now: Instant) -> bool {
        match self.last_move_broadcast {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.move_interval,
        }
    }

    /// Unthrottled full snapshot, used for self-announcement.
    pub fn announce(&mut self, now: Instant) -> MovePayload {
        self.last_move_broadcast = Some(now);
        self.pending = false;
        self.state.to_move_payload()
    }

    /// Add mini-game winnings.
    pub fn award_points(&mut self, points: u64, now: Instant) -> ScoreBroadcast {
        self.state.score = self.state.score.saturating_add(points);
        ScoreBroadcast {
            score: ScorePayload {
                id: self.state.id.clone(),
                score: self.state.score,
            },
            snapshot: self.announce(now),
        }
    }

    /// Check the current position against the hidden items of this zone.
    ///
    /// Returns the broadcast pair when at least one item was found.
    pub fn discover_items(
        &mut self,
        items: &mut HiddenItems,
        now: Instant,
    ) -> Option<ScoreBroadcast> {
        let found = items.discover(self.zone, self.state.position);
        if found.is_empty() {
            return None;
        }
        log::info!("Found hidden items {found:?}");
        Some(self.award_points(HIDDEN_ITEM_POINTS * found.len() as u64, now))
    }

    /// Submit a chat line. Blank input produces nothing; long input is cut
    /// to the accepted length.
    pub fn say(&mut self, text: &str, now: Instant) -> Option<ChatPayload> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let text: String = text.chars().take(MAX_CHAT_LEN).collect();
        self.state.set_utterance(text.clone(), now + self.utterance_ttl);
        Some(ChatPayload::new(
            self.state.id.clone(),
            self.state.display_name.clone(),
            text,
        ))
    }

    pub fn expire_utterance(&mut self, now: Instant) -> bool {
        self.state.expire_utterance(now)
    }
}
