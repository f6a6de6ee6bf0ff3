use crate::media::TrackController;
use crate::negotiation::NegotiationEngine;
use crate::signaling::SignalingOutput;
use std::sync::Arc;
use tracing::info;

/// Releases the resources of one call: relay connection, local tracks and the
/// peer link. Only the first `run` does anything.
pub struct Teardown {
    signaling: Option<Arc<dyn SignalingOutput>>,
}

impl Teardown {
    pub fn new(signaling: Arc<dyn SignalingOutput>) -> Self {
        Self {
            signaling: Some(signaling),
        }
    }

    pub fn is_done(&self) -> bool {
        self.signaling.is_none()
    }

    /// Returns `false` if teardown already happened.
    pub async fn run(&mut self, engine: &mut NegotiationEngine, tracks: &mut TrackController) -> bool {
        let Some(signaling) = self.signaling.take() else {
            return false;
        };

        signaling.close().await;
        let released = tracks.release_all();
        engine.close().await;

        info!("Call torn down ({} local track(s) released)", released);
        true
    }
}
