//! Transport handle contract and an in-process mesh implementation.
//!
//! The presence core never talks to sockets. It sees the substrate as:
//! - a [`Transport`] that knows the local [`ParticipantId`] and can
//!   fire-and-forget a named [`Action`] to every connected peer, and
//! - one inbound queue of [`TransportEvent`]s (joins, leaves, frames).
//!
//! [`MeshHub`] provides both inside a single tokio runtime. A router task
//! owns the room registry; handles talk to it over an unbounded channel, so
//! sends never block and nothing is shared behind a lock.
//!
//! ```text
//! MeshHandle A ──┐                      ┌──► events A
//! MeshHandle B ──┼──► router task ──────┼──► events B
//! MeshHandle C ──┘   (rooms → peers)    └──► events C
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{Action, ParticipantId};

/// Outbound side of the point-to-multipoint substrate.
pub trait Transport {
    /// Identifier assigned to this process at join time.
    fn local_id(&self) -> &ParticipantId;

    /// Broadcast `payload` on `action` to every other peer in the room.
    ///
    /// No acknowledgment, no retry; delivery is at-most-once and unordered.
    fn send(&self, action: Action, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Inbound notifications from the substrate, in local arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    PeerJoined(ParticipantId),
    PeerLeft(ParticipantId),
    Message {
        action: Action,
        from: ParticipantId,
        payload: Arc<Vec<u8>>,
    },
}

/// Transport errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The mesh router is gone; nothing can be sent or joined.
    #[error("Transport closed")]
    Closed,
}

/// Deterministic link faults for exercising unreliable delivery.
///
/// Counters run over every per-peer delivery of a broadcast frame.
/// Zero disables the fault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkFaults {
    /// Drop every n-th delivery.
    pub drop_every: u32,
    /// Deliver every n-th frame twice.
    pub duplicate_every: u32,
}

impl LinkFaults {
    pub fn none() -> Self {
        Self::default()
    }
}

enum MeshCommand {
    Join {
        room: String,
        id: ParticipantId,
        events: mpsc::UnboundedSender<TransportEvent>,
    },
    Leave {
        room: String,
        id: ParticipantId,
    },
    Broadcast {
        room: String,
        from: ParticipantId,
        action: Action,
        payload: Arc<Vec<u8>>,
    },
    Peers {
        room: String,
        reply: oneshot::Sender<Vec<ParticipantId>>,
    },
}

/// In-process mesh: rooms of peers exchanging named actions.
///
/// Must be created inside a tokio runtime; the router task lives until the
/// hub and every handle are dropped.
#[derive(Clone)]
pub struct MeshHub {
    commands: mpsc::UnboundedSender<MeshCommand>,
}

impl MeshHub {
    /// Create a reliable mesh.
    pub fn new() -> Self {
        Self::with_faults(LinkFaults::none())
    }

    /// Create a mesh that drops or duplicates deliveries on a fixed schedule.
    pub fn with_faults(faults: LinkFaults) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(MeshRouter::new(faults).run(rx));
        Self { commands }
    }

    /// Join `room`, obtaining a fresh participant id.
    ///
    /// Every peer already in the room is reported to the newcomer as
    /// [`TransportEvent::PeerJoined`], and the newcomer to each of them.
    pub fn join(
        &self,
        room: impl Into<String>,
    ) -> Result<(MeshHandle, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
        let room = room.into();
        let id = ParticipantId::generate();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        self.commands
            .send(MeshCommand::Join {
                room: room.clone(),
                id: id.clone(),
                events: events_tx,
            })
            .map_err(|_| TransportError::Closed)?;

        let handle = MeshHandle {
            room,
            id,
            commands: self.commands.clone(),
        };
        Ok((handle, events_rx))
    }

    /// Current members of `room`, sorted by id.
    pub async fn peers(&self, room: impl Into<String>) -> Result<Vec<ParticipantId>, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(MeshCommand::Peers { room: room.into(), reply })
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)
    }
}

impl Default for MeshHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant's membership in a mesh room.
///
/// Dropping the handle leaves the room; remaining peers get `PeerLeft`.
pub struct MeshHandle {
    room: String,
    id: ParticipantId,
    commands: mpsc::UnboundedSender<MeshCommand>,
}

impl MeshHandle {
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Leave the room now.
    pub fn leave(self) {
        drop(self);
    }
}

impl Transport for MeshHandle {
    fn local_id(&self) -> &ParticipantId {
        &self.id
    }

    fn send(&self, action: Action, payload: Vec<u8>) -> Result<(), TransportError> {
        self.commands
            .send(MeshCommand::Broadcast {
                room: self.room.clone(),
                from: self.id.clone(),
                action,
                payload: Arc::new(payload),
            })
            .map_err(|_| TransportError::Closed)
    }
}

impl Drop for MeshHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(MeshCommand::Leave {
            room: self.room.clone(),
            id: self.id.clone(),
        });
    }
}

type Room = HashMap<ParticipantId, mpsc::UnboundedSender<TransportEvent>>;

struct MeshRouter {
    rooms: HashMap<String, Room>,
    faults: LinkFaults,
    deliveries: u64,
}

impl MeshRouter {
    fn new(faults: LinkFaults) -> Self {
        Self {
            rooms: HashMap::new(),
            faults,
            deliveries: 0,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<MeshCommand>) {
        while let Some(cmd) = commands.recv().await {
            match cmd {
                MeshCommand::Join { room, id, events } => self.join(room, id, events),
                MeshCommand::Leave { room, id } => self.leave(&room, &id),
                MeshCommand::Broadcast { room, from, action, payload } => {
                    self.broadcast(&room, &from, action, payload)
                }
                MeshCommand::Peers { room, reply } => {
                    let mut peers: Vec<ParticipantId> = self
                        .rooms
                        .get(&room)
                        .map(|r| r.keys().cloned().collect())
                        .unwrap_or_default();
                    peers.sort();
                    let _ = reply.send(peers);
                }
            }
        }
        log::debug!("Mesh router stopped");
    }

    fn join(&mut self, room: String, id: ParticipantId, events: mpsc::UnboundedSender<TransportEvent>) {
        let members = self.rooms.entry(room.clone()).or_default();
        for (peer_id, peer_tx) in members.iter() {
            let _ = peer_tx.send(TransportEvent::PeerJoined(id.clone()));
            let _ = events.send(TransportEvent::PeerJoined(peer_id.clone()));
        }
        members.insert(id.clone(), events);
        log::info!("Peer {id} joined room {room} ({} present)", members.len());
    }

    fn leave(&mut self, room: &str, id: &ParticipantId) {
        let Some(members) = self.rooms.get_mut(room) else {
            return;
        };
        if members.remove(id).is_none() {
            return;
        }
        for peer_tx in members.values() {
            let _ = peer_tx.send(TransportEvent::PeerLeft(id.clone()));
        }
        log::info!("Peer {id} left room {room} ({} present)", members.len());
        if members.is_empty() {
            self.rooms.remove(room);
        }
    }

    fn broadcast(&mut self, room: &str, from: &ParticipantId, action: Action, payload: Arc<Vec<u8>>) {
        let Some(members) = self.rooms.get(room) else {
            log::warn!("Broadcast from {from} to unknown room {room}");
            return;
        };

        let mut gone = Vec::new();
        for (peer_id, peer_tx) in members.iter().filter(|(id, _)| *id != from) {
            self.deliveries += 1;
            let copies = if self.hits(self.faults.drop_every) {
                0
            } else if self.hits(self.faults.duplicate_every) {
                2
            } else {
                1
            };

            for _ in 0..copies {
                let event = TransportEvent::Message {
                    action,
                    from: from.clone(),
                    payload: payload.clone(),
                };
                if peer_tx.send(event).is_err() {
                    gone.push(peer_id.clone());
                    break;
                }
            }
        }

        // A receiver that went away without leaving is treated as a leave.
        for id in gone {
            self.leave(room, &id);
        }
    }

    fn hits(&self, every: u32) -> bool {
        every != 0 && self.deliveries % u64::from(every) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("queue closed")
    }

    #[tokio::test]
    async fn test_join_announces_both_ways() {
        let hub = MeshHub::new();
        let (a, mut rx_a) = hub.join("lobby").unwrap();
        let (b, mut rx_b) = hub.join("lobby").unwrap();

        assert_eq!(next(&mut rx_a).await, TransportEvent::PeerJoined(b.local_id().clone()));
        assert_eq!(next(&mut rx_b).await, TransportEvent::PeerJoined(a.local_id().clone()));
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let hub = MeshHub::new();
        let (a, mut rx_a) = hub.join("lobby").unwrap();
        let (_b, mut rx_b) = hub.join("lobby").unwrap();
        let _ = next(&mut rx_a).await;
        let _ = next(&mut rx_b).await;

        a.send(Action::Score, vec![1, 2, 3]).unwrap();

        match next(&mut rx_b).await {
            TransportEvent::Message { action, from, payload } => {
                assert_eq!(action, Action::Score);
                assert_eq!(&from, a.local_id());
                assert_eq!(*payload, vec![1, 2, 3]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drop_handle_sends_leave() {
        let hub = MeshHub::new();
        let (a, mut rx_a) = hub.join("lobby").unwrap();
        let (b, _rx_b) = hub.join("lobby").unwrap();
        let b_id = b.local_id().clone();
        let _ = next(&mut rx_a).await;

        b.leave();

        assert_eq!(next(&mut rx_a).await, TransportEvent::PeerLeft(b_id));
        assert_eq!(hub.peers("lobby").await.unwrap(), vec![a.local_id().clone()]);
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let hub = MeshHub::new();
        let (a, mut rx_a) = hub.join("lobby").unwrap();
        let (_c, _rx_c) = hub.join("workshop").unwrap();

        a.send(Action::Move, vec![9]).unwrap();
        assert_eq!(hub.peers("workshop").await.unwrap().len(), 1);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_receiver_counts_as_leave() {
        let hub = MeshHub::new();
        let (a, mut rx_a) = hub.join("lobby").unwrap();
        let (b, rx_b) = hub.join("lobby").unwrap();
        let b_id = b.local_id().clone();
        let _ = next(&mut rx_a).await;

        drop(rx_b);
        a.send(Action::Move, vec![0]).unwrap();

        assert_eq!(next(&mut rx_a).await, TransportEvent::PeerLeft(b_id));
        // Handle outlived its queue; its own leave is now a no-op.
        drop(b);
        assert_eq!(hub.peers("lobby").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fault_schedule_duplicates() {
        let hub = MeshHub::with_faults(LinkFaults { drop_every: 0, duplicate_every: 1 });
        let (a, _rx_a) = hub.join("lobby").unwrap();
        let (_b, mut rx_b) = hub.join("lobby").unwrap();
        let _ = next(&mut rx_b).await;

        a.send(Action::Chat, vec![7]).unwrap();
        let first = next(&mut rx_b).await;
        let second = next(&mut rx_b).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_fault_schedule_drops() {
        let hub = MeshHub::with_faults(LinkFaults { drop_every: 2, duplicate_every: 0 });
        let (a, _rx_a) = hub.join("lobby").unwrap();
        let (_b, mut rx_b) = hub.join("lobby").unwrap();
        let _ = next(&mut rx_b).await;

        for i in 0..4u8 {
            a.send(Action::Move, vec![i]).unwrap();
        }
        assert_eq!(hub.peers("lobby").await.unwrap().len(), 2);

        let mut received = Vec::new();
        while let Ok(TransportEvent::Message { payload, .. }) = rx_b.try_recv() {
            received.push(payload[0]);
        }
        assert_eq!(received, vec![0, 2]);
    }
}
