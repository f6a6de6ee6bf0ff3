use duet_client::error::CallError;
use duet_client::media::MediaConstraints;
use duet_client::negotiation::NegotiationState;
use duet_core::{PeerId, SdpType, SignalPayload};

use crate::integration::{create_test_engine, init_tracing};
use crate::utils::{camera_tracks, candidate};

#[tokio::test]
async fn test_existing_peer_offers_and_newcomer_answers() {
    init_tracing();

    let (mut a, a_links, a_out) = create_test_engine("a");
    let (mut b, b_links, b_out) = create_test_engine("b");
    let mut a_tracks = camera_tracks(MediaConstraints::default()).await;
    let mut b_tracks = camera_tracks(MediaConstraints::default()).await;
    let (pa, pb) = (PeerId::from("a"), PeerId::from("b"));

    assert_eq!(a.state(&pb), NegotiationState::Idle);
    assert_eq!(a_links.opened(), 0, "No connection before a peer is known");

    // A was first in the room; B's arrival makes A offer.
    a.on_peer_joined(pb.clone(), &mut a_tracks).await.unwrap();
    assert_eq!(a.state(&pb), NegotiationState::OfferSent);
    assert_eq!(a_out.sdp_types().await, vec![SdpType::Offer]);

    let a_link = a_links.link_for(&pb).expect("link to b");
    assert_eq!(a_link.log().tracks_added.len(), 2, "audio and video attached");

    let offer = a_out.last_sdp().await.unwrap();
    b.on_signal(pa.clone(), offer, &mut b_tracks).await.unwrap();
    assert_eq!(b.state(&pa), NegotiationState::Stable);
    assert_eq!(b.bound_peer(), Some(&pa));
    assert_eq!(b_out.sdp_types().await, vec![SdpType::Answer]);

    let answer = b_out.last_sdp().await.unwrap();
    a.on_signal(pb.clone(), answer, &mut a_tracks).await.unwrap();
    assert_eq!(a.state(&pb), NegotiationState::Stable);

    // Post-negotiation candidates go straight to the connection.
    a.on_signal(pb.clone(), SignalPayload::Candidate(candidate(1)), &mut a_tracks)
        .await
        .unwrap();
    b.on_signal(pa.clone(), SignalPayload::Candidate(candidate(2)), &mut b_tracks)
        .await
        .unwrap();

    assert_eq!(a_link.log().candidates, vec![candidate(1)]);
    let b_link = b_links.link_for(&pa).unwrap();
    assert_eq!(b_link.log().candidates, vec![candidate(2)]);
    assert_eq!(a.buffered_candidates(&pb), 0);
}

#[tokio::test]
async fn test_local_candidates_follow_the_bound_peer() {
    init_tracing();

    let (mut a, _links, out) = create_test_engine("a");
    let mut tracks = camera_tracks(MediaConstraints::default()).await;
    let pb = PeerId::from("b");

    a.on_local_candidate(&pb, candidate(1)).await.unwrap();
    assert_eq!(out.candidates_to(&pb).await, 0, "Dropped before a peer is bound");

    a.on_peer_joined(pb.clone(), &mut tracks).await.unwrap();
    a.on_local_candidate(&pb, candidate(2)).await.unwrap();
    a.on_local_candidate(&pb, candidate(3)).await.unwrap();
    assert_eq!(out.candidates_to(&pb).await, 2, "Sent from OfferSent already");
}

#[tokio::test]
async fn test_renegotiation_from_stable() {
    init_tracing();

    let (mut a, a_links, a_out) = create_test_engine("a");
    let (mut b, _b_links, b_out) = create_test_engine("b");
    let mut a_tracks = camera_tracks(MediaConstraints::default()).await;
    let mut b_tracks = camera_tracks(MediaConstraints::default()).await;
    let (pa, pb) = (PeerId::from("a"), PeerId::from("b"));

    // Nothing negotiated yet: renegotiation is a no-op.
    a.renegotiate().await.unwrap();
    assert!(a_out.signals().await.is_empty());

    a.on_peer_joined(pb.clone(), &mut a_tracks).await.unwrap();
    b.on_signal(pa.clone(), a_out.last_sdp().await.unwrap(), &mut b_tracks)
        .await
        .unwrap();
    a.on_signal(pb.clone(), b_out.last_sdp().await.unwrap(), &mut a_tracks)
        .await
        .unwrap();
    assert_eq!(a.state(&pb), NegotiationState::Stable);

    a.renegotiate().await.unwrap();
    assert_eq!(a.state(&pb), NegotiationState::Renegotiating);

    // A second offer while one is in flight is refused.
    let err = a.start_offer(&pb).await.unwrap_err();
    assert!(matches!(err, CallError::NegotiationProtocol(_)));
    assert_eq!(a_links.link_for(&pb).unwrap().log().offers_created, 2);

    // The remote side answers a renegotiation offer from Stable.
    b.on_signal(pa.clone(), a_out.last_sdp().await.unwrap(), &mut b_tracks)
        .await
        .unwrap();
    assert_eq!(b.state(&pa), NegotiationState::Stable);
    assert_eq!(b_out.sdp_types().await, vec![SdpType::Answer, SdpType::Answer]);

    a.on_signal(pb.clone(), b_out.last_sdp().await.unwrap(), &mut a_tracks)
        .await
        .unwrap();
    assert_eq!(a.state(&pb), NegotiationState::Stable);
}
