//! # northpole-presence - peer state synchronization for the North Pole world
//!
//! Keeps every participant's view of every other participant's position,
//! score and chat approximately consistent, with no central server.
//! Peers gossip full snapshots over a mesh; conflicts resolve by local
//! arrival order (last write wins).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   move/chat/score   ┌──────────────────┐
//! │ LocalPlayer      │ ──────────────────► │ PresenceChannel  │ ──► mesh
//! │ Controller       │    (throttled)      │ (encode/decode)  │
//! └────────▲─────────┘                     └────────┬─────────┘
//!          │                                        │ PresenceEvent
//!          │            ┌───────────────────┐       ▼
//!          └────────────│ PresenceSession   │◄──────┘
//!        re-announce    │ (event loop)      │
//!        on peer join   └─────────┬─────────┘
//!                                 ▼
//!                      ┌───────────────────┐      ┌──────────────┐
//!                      │ RemoteState       │ ───► │ WorldSnapshot│ (watch)
//!                      │ Reconciler        │      └──────────────┘
//!                      └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - participant ids and the three wire payloads (bincode)
//! - [`transport`] - transport contract and the in-process [`MeshHub`]
//! - [`channel`] - the `move` / `chat` / `score` streams over a transport
//! - [`controller`] - local player: input, throttle, score and chat
//! - [`reconciler`] - last-write-wins view of remote players and the chat log
//! - [`session`] - lifecycle manager and the single event loop
//! - [`world`] - zones, interactables and hidden items (local only, never replicated)
//! - [`config`] - session configuration
//!
//! ## Consistency
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Duplicate delivery | idempotent |
//! | Reordering | last applied wins, payload timestamps ignored |
//! | Score for unseen peer | dropped |
//! | Silent peer | kept until leave (or opt-in idle timeout) |
//! | Hidden items | per-process, may diverge |
//! | Chat log | last `max_chat_log` lines, deduplicated within that window |
//!
//! Participant ids are unique by transport guarantee; id collisions are
//! not handled.

pub mod protocol;
pub mod transport;
pub mod channel;
pub mod player;
pub mod world;
pub mod config;
pub mod controller;
pub mod reconciler;
pub mod session;

// Re-exports for convenience
pub use protocol::{
    Action, ChatPayload, MovePayload, ParticipantId, ProtocolError, ScorePayload, MAX_FRAME_BYTES,
};
pub use transport::{LinkFaults, MeshHandle, MeshHub, Transport, TransportError, TransportEvent};
pub use channel::{ChannelStats, PresenceChannel, PresenceEvent, SendOutcome};
pub use player::{PlayerState, Utterance, Vec2};
pub use world::{
    nearest_interactable, HiddenItem, HiddenItems, Interactable, InteractableKind, MiniGame, Zone,
};
pub use config::{ConfigError, PresenceConfig};
pub use controller::{InputDirection, LocalPlayerController, ScoreBroadcast};
pub use reconciler::{ApplyOutcome, RemoteStateReconciler, DEFAULT_CHAT_LOG};
pub use session::{LocalCommand, PresenceSession, SessionError, WorldSnapshot};
