use crate::error::{CallError, CallResult};
use crate::signaling::signaling_output::{
    SignalingChannel, SignalingEvent, SignalingOutput, SignalingTransport,
};
use async_trait::async_trait;
use dashmap::DashMap;
use duet_core::{PeerId, RoomId, SignalPayload};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct Member {
    room: String,
    tx: mpsc::Sender<SignalingEvent>,
}

#[derive(Default)]
struct RelayInner {
    rooms: DashMap<String, Vec<PeerId>>,
    members: DashMap<PeerId, Member>,
    preset_ids: Mutex<VecDeque<PeerId>>,
}

/// In-process relay with the same room semantics as the external one.
///
/// Joiners get `Welcome`, members already in the room get `PeerJoined`,
/// envelopes are routed by recipient, and a departing member produces
/// `PeerLeft` for everyone else.
#[derive(Clone, Default)]
pub struct LocalRelay {
    inner: Arc<RelayInner>,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out these identities (in order) before falling back to random ones.
    pub fn with_peer_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let relay = Self::default();
        if let Ok(mut preset) = relay.inner.preset_ids.lock() {
            preset.extend(ids.into_iter().map(|id| PeerId::from(id.into())));
        }
        relay
    }

    pub fn members(&self, room: &RoomId) -> Vec<PeerId> {
        self.inner
            .rooms
            .get(room.as_str())
            .map(|peers| peers.clone())
            .unwrap_or_default()
    }

    /// Drop one member's connection as if the relay went away under it.
    pub async fn disconnect(&self, peer_id: &PeerId) {
        if let Some(tx) = self.remove_member(peer_id).await {
            let _ = tx
                .send(SignalingEvent::Closed("relay dropped the connection".to_owned()))
                .await;
        }
    }

    fn next_id(&self) -> PeerId {
        let preset = self
            .inner
            .preset_ids
            .lock()
            .ok()
            .and_then(|mut ids| ids.pop_front());
        preset.unwrap_or_else(|| PeerId::from(Uuid::new_v4().to_string()))
    }

    fn room_peers_except(&self, room: &str, except: &PeerId) -> Vec<mpsc::Sender<SignalingEvent>> {
        let Some(peers) = self.inner.rooms.get(room) else {
            return Vec::new();
        };
        peers
            .iter()
            .filter(|id| *id != except)
            .filter_map(|id| self.inner.members.get(id).map(|m| m.tx.clone()))
            .collect()
    }

    async fn remove_member(&self, peer_id: &PeerId) -> Option<mpsc::Sender<SignalingEvent>> {
        let (_, member) = self.inner.members.remove(peer_id)?;
        if let Some(mut peers) = self.inner.rooms.get_mut(&member.room) {
            peers.retain(|id| id != peer_id);
        }
        self.inner.rooms.remove_if(&member.room, |_, peers| peers.is_empty());

        info!("{} left room '{}'", peer_id, member.room);
        for tx in self.room_peers_except(&member.room, peer_id) {
            let _ = tx.send(SignalingEvent::PeerLeft(peer_id.clone())).await;
        }
        Some(member.tx)
    }

    async fn route(&self, from: &PeerId, to: PeerId, payload: SignalPayload) -> CallResult<()> {
        let Some(from_room) = self.inner.members.get(from).map(|m| m.room.clone()) else {
            return Err(CallError::SignalingTransport(
                "relay connection closed".to_owned(),
            ));
        };
        let target = self
            .inner
            .members
            .get(&to)
            .filter(|m| m.room == from_room)
            .map(|m| m.tx.clone());

        let Some(target) = target else {
            warn!("Dropping signal from {} to {} (not in room '{}')", from, to, from_room);
            return Ok(());
        };

        debug!("Relaying signal {} -> {}", from, to);
        let _ = target
            .send(SignalingEvent::Signal {
                from: from.clone(),
                payload,
            })
            .await;
        Ok(())
    }
}

#[async_trait]
impl SignalingTransport for LocalRelay {
    async fn connect(&self, room: &RoomId) -> CallResult<SignalingChannel> {
        let peer_id = self.next_id();
        let (tx, rx) = mpsc::channel(256);

        let existing = self.room_peers_except(room.as_str(), &peer_id);
        self.inner.members.insert(
            peer_id.clone(),
            Member {
                room: room.to_string(),
                tx: tx.clone(),
            },
        );
        self.inner
            .rooms
            .entry(room.to_string())
            .or_default()
            .push(peer_id.clone());
        info!("{} joined room '{}'", peer_id, room);

        let _ = tx.send(SignalingEvent::Welcome(peer_id.clone())).await;
        for member in existing {
            let _ = member.send(SignalingEvent::PeerJoined(peer_id.clone())).await;
        }

        Ok(SignalingChannel {
            output: Arc::new(RelayOutput {
                relay: self.clone(),
                peer_id,
                closed: AtomicBool::new(false),
            }),
            events: rx,
        })
    }
}

struct RelayOutput {
    relay: LocalRelay,
    peer_id: PeerId,
    closed: AtomicBool,
}

#[async_trait]
impl SignalingOutput for RelayOutput {
    async fn send_signal(&self, to: PeerId, payload: SignalPayload) -> CallResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CallError::SignalingTransport(
                "relay connection closed".to_owned(),
            ));
        }
        self.relay.route(&self.peer_id, to, payload).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.relay.remove_member(&self.peer_id).await;
    }
}
