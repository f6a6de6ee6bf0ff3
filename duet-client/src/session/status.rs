use crate::error::CallError;
use duet_core::PeerId;
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

/// Coarse call progress, as the presentation layer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    /// Joined the room, nobody else is there yet.
    WaitingForPeer,
    /// A peer is bound and descriptions/candidates are being exchanged.
    Negotiating,
    Connected,
    /// Terminal. `None` means the local side left.
    Ended(Option<CallError>),
}

impl CallState {
    pub fn is_ended(&self) -> bool {
        matches!(self, CallState::Ended(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatus {
    pub state: CallState,
    pub muted: bool,
    pub video_off: bool,
    pub sharing: bool,
}

impl Default for CallStatus {
    fn default() -> Self {
        Self {
            state: CallState::WaitingForPeer,
            muted: false,
            video_off: false,
            sharing: false,
        }
    }
}

/// Media arriving from the remote peer.
#[derive(Clone)]
pub struct RemoteStream {
    pub peer_id: PeerId,
    pub tracks: Vec<Arc<TrackRemote>>,
}

impl RemoteStream {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            tracks: Vec::new(),
        }
    }
}
