use duet_client::media::{MediaConstraints, SyntheticMediaSource};
use duet_client::negotiation::NegotiationState;
use duet_client::signaling::LocalRelay;
use duet_client::{CallSession, SessionConfig, SessionDeps};
use duet_core::PeerId;
use std::sync::Arc;
use std::time::Duration;

use crate::integration::{init_tracing, join_test_session};
use crate::utils::{MockLinkFactory, TappedRelay, wait_for_negotiation, wait_for_status};

#[tokio::test]
async fn test_mute_and_camera_toggle_do_not_renegotiate() {
    init_tracing();

    let relay = LocalRelay::with_peer_ids(["a", "b"]);
    let pb = PeerId::from("b");

    let a = join_test_session(&relay, "room", MediaConstraints::default()).await;
    let b = join_test_session(&relay, "room", MediaConstraints::default()).await;
    assert!(wait_for_negotiation(&a.session, NegotiationState::Stable, 2000).await);
    let link = a.links.link_for(&pb).unwrap();
    let before = link.log();

    assert!(a.session.toggle_mute().await);
    assert!(a.session.toggle_video().await);
    let status = wait_for_status(&a.session, 1000, |s| s.muted && s.video_off).await;
    assert!(status.is_some());

    assert!(!a.session.toggle_mute().await);
    assert!(!a.session.toggle_video().await);

    // Enablement only: no offers, no sender changes, state untouched.
    let after = link.log();
    assert_eq!(after.offers_created, before.offers_created);
    assert_eq!(after.replaced_with, before.replaced_with);
    assert_eq!(after.tracks_added, before.tracks_added);
    assert_eq!(a.session.negotiation_state().await, NegotiationState::Stable);

    let preview = a.session.local_preview();
    let stream = preview.borrow().clone().expect("local preview");
    assert!(stream.audio().unwrap().is_enabled());
    assert!(stream.video().unwrap().is_enabled());

    a.session.leave().await.unwrap();
    b.session.leave().await.unwrap();
}

#[tokio::test]
async fn test_mute_and_camera_toggle_send_nothing_to_the_relay() {
    init_tracing();

    let relay = LocalRelay::with_peer_ids(["a", "b"]);
    let tapped = TappedRelay::new(relay.clone());
    let deps = SessionDeps {
        signaling: Arc::new(tapped.clone()),
        links: Arc::new(MockLinkFactory::new()),
        media: Arc::new(SyntheticMediaSource::new()),
    };
    let a = CallSession::join("room", &SessionConfig::default(), deps)
        .await
        .unwrap();
    let b = join_test_session(&relay, "room", MediaConstraints::default()).await;
    assert!(wait_for_negotiation(&a, NegotiationState::Stable, 2000).await);
    let before = tapped.sent();
    assert!(before > 0, "the offer went through the tap");

    assert!(a.toggle_mute().await);
    assert!(a.toggle_video().await);
    assert!(!a.toggle_mute().await);
    assert!(!a.toggle_video().await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(tapped.sent(), before);
    assert_eq!(a.negotiation_state().await, NegotiationState::Stable);

    a.leave().await.unwrap();
    b.session.leave().await.unwrap();
}

#[tokio::test]
async fn test_toggles_after_leave_report_last_state() {
    init_tracing();

    let relay = LocalRelay::new();
    let a = join_test_session(&relay, "solo", MediaConstraints::default()).await;

    assert!(a.session.toggle_mute().await);
    a.session.leave().await.unwrap();

    assert!(a.session.toggle_mute().await, "still reported muted");
    assert!(!a.session.toggle_share().await);
    assert_eq!(a.session.negotiation_state().await, NegotiationState::Idle);
}
