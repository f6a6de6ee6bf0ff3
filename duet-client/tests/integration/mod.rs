//! Integration tests for duet-client.
//!
//! Tests are organized by functionality:
//! - `negotiation_tests` - offer/answer, glare, candidate buffering, protocol anomalies
//! - `session_tests` - join/leave lifecycle, media controls, failure handling

pub mod negotiation_tests;

use duet_client::media::{MediaConstraints, SyntheticMediaSource};
use duet_client::negotiation::NegotiationEngine;
use duet_client::signaling::LocalRelay;
use duet_client::{CallSession, SessionConfig, SessionDeps};
use duet_core::PeerId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Level;

use crate::utils::{MockLinkFactory, RecordingOutput};

/// Initialize tracing for tests (call once per test).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// An engine for `local_id` wired to mocks.
///
/// Transport events the mock links would report are not consumed; tests
/// drive the engine directly.
pub fn create_test_engine(local_id: &str) -> (NegotiationEngine, MockLinkFactory, RecordingOutput) {
    let links = MockLinkFactory::new();
    let output = RecordingOutput::new_stored_only();
    let (transport_tx, _transport_rx) = mpsc::channel(256);

    let mut engine = NegotiationEngine::new(Arc::new(links.clone()), Arc::new(output.clone()), transport_tx);
    engine.set_local_id(PeerId::from(local_id));
    (engine, links, output)
}

/// One participant of an in-process call.
pub struct TestParticipant {
    pub session: CallSession,
    pub links: MockLinkFactory,
    pub media: Arc<SyntheticMediaSource>,
}

/// Join `room` on `relay` with synthetic media and mock links.
pub async fn join_test_session(
    relay: &LocalRelay,
    room: &str,
    constraints: MediaConstraints,
) -> TestParticipant {
    let links = MockLinkFactory::new();
    let media = Arc::new(SyntheticMediaSource::new());
    let config = SessionConfig {
        media: constraints,
        ..SessionConfig::default()
    };
    let deps = SessionDeps {
        signaling: Arc::new(relay.clone()),
        links: Arc::new(links.clone()),
        media: media.clone(),
    };

    let session = CallSession::join(room, &config, deps)
        .await
        .expect("Failed to join test session");
    TestParticipant {
        session,
        links,
        media,
    }
}
