use duet_client::media::{MediaConstraints, MediaSource, SyntheticMediaSource, TrackController};
use duet_client::negotiation::NegotiationState;
use duet_client::{CallSession, CallStatus};
use duet_core::IceCandidate;
use std::time::Duration;

/// A host candidate whose text identifies it by `n`.
pub fn candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 192.168.1.{n} 4{n:04} typ host"),
        sdp_m_line_index: Some(0),
        sdp_mid: Some("0".to_owned()),
    }
}

/// A track controller holding synthetic camera and microphone tracks.
pub async fn camera_tracks(constraints: MediaConstraints) -> TrackController {
    let mut tracks = TrackController::new();
    let stream = SyntheticMediaSource::new()
        .user_media(constraints)
        .await
        .expect("synthetic media");
    tracks.install(stream);
    tracks
}

/// Poll the session until it reports `state` or the timeout passes.
pub async fn wait_for_negotiation(
    session: &CallSession,
    state: NegotiationState,
    timeout_ms: u64,
) -> bool {
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    loop {
        if session.negotiation_state().await == state {
            return true;
        }
        if start.elapsed() > timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the published status satisfies `pred`.
pub async fn wait_for_status<F>(session: &CallSession, timeout_ms: u64, pred: F) -> Option<CallStatus>
where
    F: FnMut(&CallStatus) -> bool,
{
    let mut status = session.status();
    let res = tokio::time::timeout(Duration::from_millis(timeout_ms), status.wait_for(pred)).await;
    match res {
        Ok(Ok(current)) => Some(current.clone()),
        _ => None,
    }
}
