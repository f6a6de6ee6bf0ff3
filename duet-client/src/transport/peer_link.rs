use crate::media::LocalTrack;
use crate::transport::TransportEvent;
use anyhow::Result;
use async_trait::async_trait;
use duet_core::{IceCandidate, PeerId, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The underlying peer-to-peer connection for one remote peer.
///
/// Description and candidate calls are never issued concurrently for the same
/// link; the negotiation engine serializes them.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Create an offer and install it as the local description. Returns the SDP.
    async fn create_offer(&self) -> Result<String>;

    /// Create an answer to the applied remote offer and install it locally.
    async fn create_answer(&self) -> Result<String>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Drop a pending local offer and return to a stable signaling state.
    async fn rollback_local_offer(&self) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Attach a local track. Attaching a video track makes it the video sender.
    async fn add_track(&self, track: &LocalTrack) -> Result<()>;

    /// Swap the source of the video sender in place, without renegotiation.
    async fn replace_video_track(&self, track: &LocalTrack) -> Result<()>;

    async fn remove_video_track(&self) -> Result<()>;

    async fn has_video_sender(&self) -> bool;

    /// Close the connection. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Creates links on demand, once a remote peer is known.
#[async_trait]
pub trait LinkFactory: Send + Sync {
    async fn open(
        &self,
        peer_id: PeerId,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerLink>>;
}
