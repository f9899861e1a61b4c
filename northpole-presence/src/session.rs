//! Presence session: the lifecycle manager and single event loop.
//!
//! ## Event flow
//!
//! ```text
//!  TransportEvent ──► PresenceChannel::decode ──► PresenceEvent ─┐
//!                                                                ├──► PresenceSession
//!  LocalCommand (input, score, chat) ────────────────────────────┤      │
//!  sweep interval / startup announce timer ──────────────────────┘      │
//!                                                                       ▼
//!                                               watch::Sender<WorldSnapshot>
//! ```
//!
//! The session owns the controller, reconciler and channel outright. All
//! mutation happens inside one task, one event at a time, so there are no
//! locks. Handlers are synchronous and take `now` explicitly; [`run`] only
//! multiplexes the inputs and timers.
//!
//! Catch-up is passive: on every peer join the local player re-announces
//! its full snapshot, and a newcomer learns about existing peers from
//! theirs. The very first self-announcement is delayed once at startup.
//!
//! [`run`]: PresenceSession::run

use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::channel::{ChannelStats, PresenceChannel, PresenceEvent};
use crate::config::{ConfigError, PresenceConfig};
use crate::controller::{InputDirection, LocalPlayerController, ScoreBroadcast};
use crate::player::{PlayerState, Vec2};
use crate::protocol::{ChatPayload, MovePayload, ParticipantId};
use crate::reconciler::{ApplyOutcome, RemoteStateReconciler};
use crate::transport::{MeshHandle, MeshHub, Transport, TransportError, TransportEvent};
use crate::world::{HiddenItems, Interactable, InteractableKind, Zone};

/// Local-side inputs to the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalCommand {
    /// One sample of held direction keys
    Input(InputDirection),
    MoveTo { x: f32, y: f32 },
    /// Use the nearest interactable (portal, game or NPC)
    Interact,
    /// Mini-game winnings
    AwardPoints(u64),
    Say(String),
    Shutdown,
}

/// Read-only view of the world for renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub local: PlayerState,
    /// Remote players sorted by id
    pub remotes: Vec<PlayerState>,
    /// Chat lines in local arrival order
    pub chat: Vec<ChatPayload>,
    pub zone: Zone,
    /// Interactable in range of the local player
    pub nearby: Option<Interactable>,
    /// Last interactable the local player used
    pub engaged: Option<Interactable>,
}

impl WorldSnapshot {
    pub fn remote(&self, id: &ParticipantId) -> Option<&PlayerState> {
        self.remotes.iter().find(|p| &p.id == id)
    }

    /// Every known player, local included, best score first.
    pub fn leaderboard(&self) -> Vec<&PlayerState> {
        let mut players: Vec<&PlayerState> =
            std::iter::once(&self.local).chain(self.remotes.iter()).collect();
        players.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        players
    }
}

/// Session start-up errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct PresenceSession<T> {
    config: PresenceConfig,
    channel: PresenceChannel<T>,
    controller: LocalPlayerController,
    reconciler: RemoteStateReconciler,
    hidden_items: HiddenItems,
    engaged: Option<Interactable>,
    announced: bool,
    snapshot_tx: watch::Sender<WorldSnapshot>,
}

impl PresenceSession<MeshHandle> {
    /// Join the configured room on an in-process mesh.
    pub fn join(
        hub: &MeshHub,
        config: PresenceConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), SessionError> {
        config.validate()?;
        let (handle, events) = hub.join(config.room.clone())?;
        let session = Self::new(handle, config, now())?;
        Ok((session, events))
    }
}

impl<T: Transport> PresenceSession<T> {
    pub fn new(transport: T, config: PresenceConfig, now: Instant) -> Result<Self, ConfigError> {
        config.validate()?;
        let local_id = transport.local_id().clone();
        let controller = LocalPlayerController::new(local_id.clone(), &config, now);
        let reconciler = RemoteStateReconciler::new(local_id, config.utterance_ttl())
            .with_chat_capacity(config.max_chat_log);

        let initial = WorldSnapshot {
            local: controller.state().clone(),
            remotes: Vec::new(),
            chat: Vec::new(),
            zone: controller.zone(),
            nearby: controller.nearby().copied(),
            engaged: None,
        };
        let (snapshot_tx, _) = watch::channel(initial);

        Ok(Self {
            config,
            channel: PresenceChannel::new(transport),
            controller,
            reconciler,
            hidden_items: HiddenItems::standard(),
            engaged: None,
            announced: false,
            snapshot_tx,
        })
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.controller.state().id
    }

    pub fn local(&self) -> &PlayerState {
        self.controller.state()
    }

    pub fn reconciler(&self) -> &RemoteStateReconciler {
        &self.reconciler
    }

    pub fn hidden_items(&self) -> &HiddenItems {
        &self.hidden_items
    }

    pub fn channel_stats(&self) -> &ChannelStats {
        self.channel.stats()
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    /// Receiver that sees a fresh [`WorldSnapshot`] after every change.
    pub fn subscribe(&self) -> watch::Receiver<WorldSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            local: self.controller.state().clone(),
            remotes: self.reconciler.participants(),
            chat: self.reconciler.chat_log().iter().cloned().collect(),
            zone: self.controller.zone(),
            nearby: self.controller.nearby().copied(),
            engaged: self.engaged,
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    /// Broadcast the full local snapshot, bypassing the throttle.
    pub fn announce(&mut self, now: Instant) {
        self.announced = true;
        let snapshot = self.controller.announce(now);
        self.channel.send_move(&snapshot);
    }

    /// Decode and apply one transport notification.
    pub fn handle_transport_event(&mut self, event: TransportEvent, now: Instant) -> bool {
        match self.channel.decode(event) {
            Some(event) => self.handle_event(event, now),
            None => false,
        }
    }

    /// Apply one presence event. Returns whether the world view changed.
    pub fn handle_event(&mut self, event: PresenceEvent, now: Instant) -> bool {
        match event {
            PresenceEvent::PeerJoined(id) => {
                log::info!("Peer {id} joined; re-announcing");
                self.announce(now);
                false
            }
            PresenceEvent::PeerLeft(id) => match self.reconciler.remove(&id) {
                Some(player) => {
                    log::info!("Peer {id} ({}) left", player.display_name);
                    true
                }
                None => {
                    log::debug!("Peer {id} left before announcing itself");
                    false
                }
            },
            PresenceEvent::MoveReceived { from, payload } => {
                let outcome = self.reconciler.apply_move(&from, &payload, now);
                if outcome == ApplyOutcome::Created {
                    log::info!("Now seeing {} ({from})", payload.display_name);
                }
                outcome != ApplyOutcome::Ignored
            }
            PresenceEvent::ChatReceived { payload, .. } => {
                log::debug!("Chat from {}: {}", payload.sender_name, payload.text);
                self.reconciler.apply_chat(&payload, now) != ApplyOutcome::Ignored
            }
            PresenceEvent::ScoreReceived { from, payload } => {
                let outcome = self.reconciler.apply_score(&from, &payload, now);
                if outcome == ApplyOutcome::Ignored {
                    log::debug!("Score for unseen peer {from} dropped");
                }
                outcome != ApplyOutcome::Ignored
            }
        }
    }

    /// Apply one local command. Returns whether the world view changed.
    ///
    /// `Shutdown` is handled by [`run`](Self::run) and is a no-op here.
    pub fn handle_command(&mut self, command: LocalCommand, now: Instant) -> bool {
        match command {
            LocalCommand::Input(input) => {
                let before = self.controller.state().position;
                let moved = self.controller.apply_input(input, now);
                self.after_move(before, moved, now)
            }
            LocalCommand::MoveTo { x, y } => {
                let before = self.controller.state().position;
                let moved = self.controller.move_to(x, y, now);
                self.after_move(before, moved, now)
            }
            LocalCommand::Interact => {
                let before = self.controller.state().position;
                let Some((item, moved)) = self.controller.interact(now) else {
                    return false;
                };
                match item.kind {
                    InteractableKind::Portal { target } => {
                        log::info!("Took {} to {}", item.label, target.name());
                    }
                    InteractableKind::Game(game) => {
                        log::info!("Opened mini-game {game:?} at {}", item.label);
                    }
                    InteractableKind::Npc { message } => {
                        log::info!("{}: {message}", item.label);
                    }
                }
                self.engaged = Some(*item);
                self.after_move(before, moved, now);
                true
            }
            LocalCommand::AwardPoints(points) => {
                let out = self.controller.award_points(points, now);
                self.send_score(out);
                true
            }
            LocalCommand::Say(text) => match self.controller.say(&text, now) {
                Some(chat) => {
                    self.reconciler.record_local_chat(&chat);
                    self.channel.send_chat(&chat);
                    true
                }
                None => false,
            },
            LocalCommand::Shutdown => false,
        }
    }

    /// Broadcast a move if one was produced and check for hidden items.
    /// Returns whether the local player changed.
    fn after_move(&mut self, before: Vec2, moved: Option<MovePayload>, now: Instant) -> bool {
        if let Some(snapshot) = moved {
            self.channel.send_move(&snapshot);
        }
        let found = match self.controller.discover_items(&mut self.hidden_items, now) {
            Some(out) => {
                self.send_score(out);
                true
            }
            None => false,
        };
        found || self.controller.state().position != before
    }

    fn send_score(&mut self, out: ScoreBroadcast) {
        self.channel.send_score(&out.score);
        self.channel.send_move(&out.snapshot);
    }

    /// Periodic sweep: flush a throttled position, expire utterances
    /// everywhere and, if configured, evict silent peers. Returns whether
    /// the world view changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if let Some(snapshot) = self.controller.flush(now) {
            self.channel.send_move(&snapshot);
        }

        let mut changed = self.controller.expire_utterance(now);
        changed |= self.reconciler.sweep_utterances(now) > 0;

        if let Some(timeout) = self.config.idle_timeout() {
            let evicted = self.reconciler.evict_idle(now, timeout);
            for id in &evicted {
                log::info!("Evicted idle peer {id}");
            }
            changed |= !evicted.is_empty();
        }
        changed
    }

    /// Run the event loop until shutdown.
    ///
    /// Stops on [`LocalCommand::Shutdown`], when every command sender is
    /// dropped, or when the transport event queue closes. The transport is
    /// released before returning; the final view is returned.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        mut commands: mpsc::Receiver<LocalCommand>,
    ) -> WorldSnapshot {
        log::info!(
            "Presence session {} ({}) started in room {}",
            self.local_id(),
            self.config.display_name,
            self.config.room
        );

        let announce_timer = tokio::time::sleep(self.config.announce_delay());
        tokio::pin!(announce_timer);

        let mut sweep = tokio::time::interval(self.config.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = &mut announce_timer, if !self.announced => {
                    self.announce(now());
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if self.handle_transport_event(event, now()) {
                            self.publish();
                        }
                    }
                    None => {
                        log::info!("Transport closed; stopping session {}", self.local_id());
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(LocalCommand::Shutdown) | None => break,
                    Some(command) => {
                        if self.handle_command(command, now()) {
                            self.publish();
                        }
                    }
                },
                _ = sweep.tick() => {
                    if self.tick(now()) {
                        self.publish();
                    }
                }
            }
        }

        self.channel.detach();
        let stats = self.channel.stats();
        log::info!(
            "Presence session {} stopped: {} sent, {} received, {} rejected",
            self.local_id(),
            stats.sent,
            stats.received,
            stats.rejected
        );
        self.snapshot()
    }
}

/// Current time on the runtime clock (pausable in tests).
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
