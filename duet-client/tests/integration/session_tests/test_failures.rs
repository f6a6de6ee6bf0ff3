use async_trait::async_trait;
use duet_client::error::CallError;
use duet_client::media::{
    LocalStream, LocalTrack, MediaConstraints, MediaSource, SyntheticMediaSource,
};
use duet_client::signaling::{LocalRelay, SignalingChannel, SignalingTransport};
use duet_client::transport::LinkState;
use duet_client::{CallResult, CallSession, CallState, SessionConfig, SessionDeps};
use duet_core::{PeerId, RoomId};
use std::sync::{Arc, Mutex};

use crate::integration::{init_tracing, join_test_session};
use crate::utils::{MockLinkFactory, wait_for_negotiation, wait_for_status};
use duet_client::negotiation::NegotiationState;

/// A relay that cannot be reached.
struct UnreachableRelay;

#[async_trait]
impl SignalingTransport for UnreachableRelay {
    async fn connect(&self, _room: &RoomId) -> CallResult<SignalingChannel> {
        Err(CallError::SignalingTransport("connection refused".to_owned()))
    }
}

/// Synthetic media that remembers what it handed out.
#[derive(Default)]
struct TrackingMedia {
    inner: SyntheticMediaSource,
    handed_out: Mutex<Vec<LocalTrack>>,
}

#[async_trait]
impl MediaSource for TrackingMedia {
    async fn user_media(&self, constraints: MediaConstraints) -> CallResult<LocalStream> {
        let stream = self.inner.user_media(constraints).await?;
        self.handed_out
            .lock()
            .unwrap()
            .extend(stream.tracks.iter().cloned());
        Ok(stream)
    }

    async fn display_media(&self) -> CallResult<LocalTrack> {
        self.inner.display_media().await
    }
}

#[tokio::test]
async fn test_media_failure_fails_join_and_leaves_relay() {
    init_tracing();

    let relay = LocalRelay::new();
    let deps = SessionDeps {
        signaling: Arc::new(relay.clone()),
        links: Arc::new(MockLinkFactory::new()),
        media: Arc::new(SyntheticMediaSource::new().deny_user_media()),
    };

    let err = CallSession::join("r1", &SessionConfig::default(), deps)
        .await
        .err()
        .expect("join must fail without media");
    assert!(matches!(err, CallError::MediaAcquisition(_)));
    assert!(relay.members(&RoomId::parse("r1").unwrap()).is_empty());

    // Retrying with working media succeeds.
    let a = join_test_session(&relay, "r1", MediaConstraints::default()).await;
    assert_eq!(relay.members(&RoomId::parse("r1").unwrap()).len(), 1);
    a.session.leave().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_relay_releases_media() {
    init_tracing();

    let media = Arc::new(TrackingMedia::default());
    let deps = SessionDeps {
        signaling: Arc::new(UnreachableRelay),
        links: Arc::new(MockLinkFactory::new()),
        media: media.clone(),
    };

    let err = CallSession::join("r1", &SessionConfig::default(), deps)
        .await
        .err()
        .expect("join must fail without a relay");
    assert!(matches!(err, CallError::SignalingTransport(_)));

    let tracks = media.handed_out.lock().unwrap().clone();
    assert_eq!(tracks.len(), 2);
    assert!(tracks.iter().all(LocalTrack::is_stopped));
}

#[tokio::test]
async fn test_relay_drop_ends_the_call() {
    init_tracing();

    let relay = LocalRelay::with_peer_ids(["a", "b"]);
    let pa = PeerId::from("a");

    let a = join_test_session(&relay, "r1", MediaConstraints::default()).await;
    let b = join_test_session(&relay, "r1", MediaConstraints::default()).await;
    assert!(wait_for_negotiation(&b.session, NegotiationState::Stable, 2000).await);

    relay.disconnect(&PeerId::from("b")).await;

    let ended = wait_for_status(&b.session, 1000, |s| s.state.is_ended()).await;
    assert!(matches!(
        ended.map(|s| s.state),
        Some(CallState::Ended(Some(CallError::SignalingTransport(_))))
    ));
    assert_eq!(b.links.link_for(&pa).unwrap().log().closes, 1);
    assert!(b.session.local_preview().borrow().is_none());

    // Leaving after the fact is a quiet no-op.
    assert!(b.session.leave().await.is_ok());

    let waiting = wait_for_status(&a.session, 1000, |s| s.state == CallState::WaitingForPeer).await;
    assert!(waiting.is_some());
    a.session.leave().await.unwrap();
}

#[tokio::test]
async fn test_connection_failure_ends_the_call() {
    init_tracing();

    let relay = LocalRelay::with_peer_ids(["a", "b"]);
    let pb = PeerId::from("b");

    let a = join_test_session(&relay, "r1", MediaConstraints::default()).await;
    let b = join_test_session(&relay, "r1", MediaConstraints::default()).await;
    assert!(wait_for_negotiation(&a.session, NegotiationState::Stable, 2000).await);

    a.links.report_state(&pb, LinkState::Failed).await;

    let ended = wait_for_status(&a.session, 1000, |s| s.state.is_ended()).await;
    assert!(matches!(
        ended.map(|s| s.state),
        Some(CallState::Ended(Some(CallError::Connectivity(_))))
    ));
    assert_eq!(a.links.link_for(&pb).unwrap().log().closes, 1);

    b.session.leave().await.unwrap();
}

#[tokio::test]
async fn test_dropping_the_handle_tears_down() {
    init_tracing();

    let relay = LocalRelay::with_peer_ids(["a"]);
    let room = RoomId::parse("r1").unwrap();

    let a = join_test_session(&relay, "r1", MediaConstraints::default()).await;
    let mut status = a.session.status();
    assert_eq!(relay.members(&room).len(), 1);

    drop(a);

    let ended = tokio::time::timeout(
        std::time::Duration::from_secs(1),
        status.wait_for(|s| s.state == CallState::Ended(None)),
    )
    .await;
    assert!(matches!(ended, Ok(Ok(_))));
    assert!(relay.members(&room).is_empty());
}
