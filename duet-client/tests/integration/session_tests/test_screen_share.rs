use duet_client::media::{MediaConstraints, VideoSource};
use duet_client::negotiation::NegotiationState;
use duet_client::signaling::LocalRelay;
use duet_client::CallState;
use duet_core::PeerId;

use crate::integration::{init_tracing, join_test_session};
use crate::utils::{wait_for_negotiation, wait_for_status};

#[tokio::test]
async fn test_share_substitutes_and_external_end_restores_camera() {
    init_tracing();

    let relay = LocalRelay::with_peer_ids(["a", "b"]);
    let pb = PeerId::from("b");

    let a = join_test_session(&relay, "r1", MediaConstraints::default()).await;
    let b = join_test_session(&relay, "r1", MediaConstraints::default()).await;
    assert!(wait_for_negotiation(&a.session, NegotiationState::Stable, 2000).await);

    let link = a.links.link_for(&pb).unwrap();
    let camera_id = link.video_track().expect("camera on the video sender");

    assert!(a.session.toggle_share().await);
    let preview = a.session.local_preview();
    let screen = preview
        .borrow()
        .as_ref()
        .and_then(|s| s.video().cloned())
        .expect("screen in preview");
    assert_eq!(screen.source(), Some(VideoSource::Screen));
    assert_eq!(link.video_track().as_deref(), Some(screen.id()));
    assert_eq!(link.log().offers_created, 1, "substitution, not renegotiation");
    assert_eq!(a.session.negotiation_state().await, NegotiationState::Stable);

    // The host's own "stop sharing" control ends the track under us.
    screen.end();
    let status = wait_for_status(&a.session, 1000, |s| !s.sharing).await;
    assert!(status.is_some());

    assert_eq!(link.video_track(), Some(camera_id.clone()));
    assert_eq!(link.log().replaced_with, vec![screen.id().to_owned(), camera_id]);
    assert!(screen.is_stopped());
    assert_eq!(a.session.negotiation_state().await, NegotiationState::Stable);
    assert_eq!(link.log().offers_created, 1);

    a.session.leave().await.unwrap();
    b.session.leave().await.unwrap();
}

#[tokio::test]
async fn test_toggle_share_twice_stops_sharing() {
    init_tracing();

    let relay = LocalRelay::with_peer_ids(["a", "b"]);
    let a = join_test_session(&relay, "r1", MediaConstraints::default()).await;

    assert!(a.session.toggle_share().await);
    assert!(!a.session.toggle_share().await);
    let status = wait_for_status(&a.session, 1000, |s| !s.sharing).await;
    assert!(status.is_some());

    a.session.leave().await.unwrap();
}

#[tokio::test]
async fn test_refused_display_picker_keeps_call() {
    init_tracing();

    let relay = LocalRelay::with_peer_ids(["a", "b"]);
    let a = join_test_session(&relay, "r1", MediaConstraints::default()).await;
    let b = join_test_session(&relay, "r1", MediaConstraints::default()).await;
    assert!(wait_for_negotiation(&a.session, NegotiationState::Stable, 2000).await);

    a.media.set_deny_display(true);
    assert!(!a.session.toggle_share().await);
    assert!(!a.session.status().borrow().state.is_ended());
    assert_eq!(a.session.negotiation_state().await, NegotiationState::Stable);

    a.session.leave().await.unwrap();
    b.session.leave().await.unwrap();
}

#[tokio::test]
async fn test_share_in_audio_only_call_renegotiates() {
    init_tracing();

    let relay = LocalRelay::with_peer_ids(["a", "b"]);
    let pb = PeerId::from("b");
    let audio_only = MediaConstraints {
        audio: true,
        video: false,
    };

    let a = join_test_session(&relay, "r1", audio_only).await;
    let b = join_test_session(&relay, "r1", MediaConstraints::default()).await;
    assert!(wait_for_negotiation(&a.session, NegotiationState::Stable, 2000).await);

    let link = a.links.link_for(&pb).unwrap();
    assert!(link.video_track().is_none());

    // Adding a video sender is structural: a fresh offer/answer round.
    assert!(a.session.toggle_share().await);
    assert!(wait_for_negotiation(&a.session, NegotiationState::Stable, 2000).await);
    assert_eq!(link.log().offers_created, 2);

    assert!(!a.session.toggle_share().await);
    assert!(wait_for_negotiation(&a.session, NegotiationState::Stable, 2000).await);
    assert_eq!(link.log().offers_created, 3);
    assert_eq!(link.log().video_removed, 1);

    let status = a.session.status().borrow().clone();
    assert_eq!(status.state, CallState::Negotiating);
    assert!(!status.sharing);

    a.session.leave().await.unwrap();
    b.session.leave().await.unwrap();
}
