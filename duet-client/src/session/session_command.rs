use crate::negotiation::NegotiationState;
use tokio::sync::oneshot;

/// Requests from the `CallSession` handle (and screen-track watchers) to the
/// session loop.
#[derive(Debug)]
pub enum SessionCommand {
    ToggleMute(oneshot::Sender<bool>),

    ToggleVideo(oneshot::Sender<bool>),

    ToggleShare(oneshot::Sender<bool>),

    /// A display track ended outside our control (e.g. the host's "stop sharing" button).
    ScreenShareEnded { track_id: String },

    NegotiationState(oneshot::Sender<NegotiationState>),

    /// Tear everything down. The reply fires once teardown finished.
    Leave(oneshot::Sender<()>),
}
