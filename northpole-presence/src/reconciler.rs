//! Remote state reconciler.
//!
//! Translates inbound presence messages, keyed by sender, into this
//! process's view of every remote participant. Conflicts resolve by
//! local arrival order (last applied write wins), never by payload
//! timestamp:
//!
//! | Message | Unknown sender | Known sender |
//! |---------|----------------|--------------|
//! | `move`  | create         | overwrite name, avatar, score, position |
//! | `score` | no-op          | overwrite score only |
//! | `chat`  | log only       | log + set utterance |
//!
//! Every apply is idempotent: delivering the same message twice leaves the
//! same state as delivering it once. The chat log is bounded; once full,
//! the oldest line (and its dedup entry) is dropped for each new one.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use crate::player::PlayerState;
use crate::protocol::{ChatPayload, MovePayload, ParticipantId, ScorePayload};

/// What an apply did to the remote view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Ignored,
}

/// Chat lines kept unless configured otherwise.
pub const DEFAULT_CHAT_LOG: usize = 200;

pub struct RemoteStateReconciler {
    local_id: ParticipantId,
    peers: HashMap<ParticipantId, PlayerState>,
    chat_log: VecDeque<ChatPayload>,
    seen_chat: HashSet<String>,
    chat_capacity: usize,
    utterance_ttl: Duration,
}

impl RemoteStateReconciler {
    pub fn new(local_id: ParticipantId, utterance_ttl: Duration) -> Self {
        Self {
            local_id,
            peers: HashMap::new(),
            chat_log: VecDeque::new(),
            seen_chat: HashSet::new(),
            chat_capacity: DEFAULT_CHAT_LOG,
            utterance_ttl,
        }
    }

    /// Keep at most `capacity` chat lines (at least one).
    pub fn with_chat_capacity(mut self, capacity: usize) -> Self {
        self.chat_capacity = capacity.max(1);
        self
    }

    pub fn apply_move(
        &mut self,
        sender: &ParticipantId,
        payload: &MovePayload,
        now: Instant,
    ) -> ApplyOutcome {
        if *sender == self.local_id {
            return ApplyOutcome::Ignored;
        }
        match self.peers.get_mut(sender) {
            Some(peer) => {
                peer.apply_move(payload, now);
                ApplyOutcome::Updated
            }
            None => {
                let peer = PlayerState::from_move(sender.clone(), payload, now);
                log::debug!("New remote player {} ({})", peer.display_name, sender);
                self.peers.insert(sender.clone(), peer);
                ApplyOutcome::Created
            }
        }
    }

    /// Apply a score update. A sender without a known state is an expected
    /// join-ordering race and the update is simply lost.
    pub fn apply_score(
        &mut self,
        sender: &ParticipantId,
        payload: &ScorePayload,
        now: Instant,
    ) -> ApplyOutcome {
        if *sender == self.local_id {
            return ApplyOutcome::Ignored;
        }
        match self.peers.get_mut(sender) {
            Some(peer) => {
                peer.set_score(payload.score, now);
                ApplyOutcome::Updated
            }
            None => ApplyOutcome::Ignored,
        }
    }

    /// Append a chat line to the log in arrival order and, if the sender is
    /// known, show it above their avatar until `now + ttl`.
    ///
    /// A chat id already in the log is ignored entirely.
    pub fn apply_chat(&mut self, payload: &ChatPayload, now: Instant) -> ApplyOutcome {
        if !self.log_chat(payload) {
            return ApplyOutcome::Ignored;
        }

        if let Some(peer) = self.peers.get_mut(&payload.sender_id) {
            peer.set_utterance(payload.text.clone(), now + self.utterance_ttl);
            peer.touch(now);
        }
        ApplyOutcome::Updated
    }

    /// Record a chat line written locally.
    pub fn record_local_chat(&mut self, payload: &ChatPayload) {
        self.log_chat(payload);
    }

    /// Append unless already logged. Returns whether it was appended.
    fn log_chat(&mut self, payload: &ChatPayload) -> bool {
        if !self.seen_chat.insert(payload.id.clone()) {
            return false;
        }
        while self.chat_log.len() >= self.chat_capacity {
            if let Some(oldest) = self.chat_log.pop_front() {
                self.seen_chat.remove(&oldest.id);
            }
        }
        self.chat_log.push_back(payload.clone());
        true
    }

    /// Forget a departed participant. No grace period.
    pub fn remove(&mut self, id: &ParticipantId) -> Option<PlayerState> {
        self.peers.remove(id)
    }

    /// Clear utterances whose expiry has passed. Returns how many cleared.
    pub fn sweep_utterances(&mut self, now: Instant) -> usize {
        self.peers
            .values_mut()
            .map(|peer| peer.expire_utterance(now))
            .filter(|cleared| *cleared)
            .count()
    }

    /// Drop remote players not heard from within `timeout`.
    pub fn evict_idle(&mut self, now: Instant, timeout: Duration) -> Vec<ParticipantId> {
        let stale: Vec<ParticipantId> = self
            .peers
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.last_heard()) > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.peers.remove(id);
        }
        stale
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&PlayerState> {
        self.peers.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Remote players sorted by id.
    pub fn participants(&self) -> Vec<PlayerState> {
        let mut players: Vec<PlayerState> = self.peers.values().cloned().collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        players
    }

    /// Chat lines in arrival order, oldest first.
    pub fn chat_log(&self) -> &VecDeque<ChatPayload> {
        &self.chat_log
    }
}
