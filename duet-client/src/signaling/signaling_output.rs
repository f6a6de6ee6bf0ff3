use crate::error::CallResult;
use async_trait::async_trait;
use duet_core::{PeerId, RoomId, SignalPayload};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What the relay tells us.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// Our own identity for this transport session.
    Welcome(PeerId),
    PeerJoined(PeerId),
    PeerLeft(PeerId),
    Signal { from: PeerId, payload: SignalPayload },
    /// The relay connection is gone. Nothing follows this event.
    Closed(String),
}

/// Outgoing half of a relay connection.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Send a payload to one peer in the room.
    async fn send_signal(&self, to: PeerId, payload: SignalPayload) -> CallResult<()>;

    /// Drop the relay connection. Calling it again is a no-op.
    async fn close(&self);
}

/// A joined relay connection: where to send, and what arrives.
pub struct SignalingChannel {
    pub output: Arc<dyn SignalingOutput>,
    pub events: mpsc::Receiver<SignalingEvent>,
}

/// Connects to the relay and joins a room.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn connect(&self, room: &RoomId) -> CallResult<SignalingChannel>;
}
