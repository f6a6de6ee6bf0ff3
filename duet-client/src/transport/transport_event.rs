use duet_core::{IceCandidate, PeerId};
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

/// Coarse view of the underlying connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    /// ICE failed or the connection dropped. Fatal for the call.
    Failed,
    Closed,
}

/// Events a peer link reports back to the session loop.
pub enum TransportEvent {
    /// A local connectivity candidate was gathered and should go to the remote peer.
    CandidateGenerated(PeerId, IceCandidate),

    StateChanged(PeerId, LinkState),

    /// The remote peer started sending a track.
    RemoteTrack(PeerId, Arc<TrackRemote>),
}
