use crate::config::SessionConfig;
use crate::error::{CallError, CallResult};
use crate::media::{LocalStream, MediaSource, TrackController};
use crate::negotiation::{NegotiationEngine, NegotiationState};
use crate::session::session_command::SessionCommand;
use crate::session::session_loop::{SessionLoop, SessionSinks};
use crate::session::status::{CallStatus, RemoteStream};
use crate::session::teardown::Teardown;
use crate::signaling::{SignalingTransport, WsSignalingTransport};
use crate::transport::{LinkFactory, RtcLinkFactory};
use duet_core::RoomId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

/// Platform pieces a call is built from.
#[derive(Clone)]
pub struct SessionDeps {
    pub signaling: Arc<dyn SignalingTransport>,
    pub links: Arc<dyn LinkFactory>,
    pub media: Arc<dyn MediaSource>,
}

impl SessionDeps {
    /// WebSocket relay and `webrtc` connections, configured from `config`.
    pub fn native(config: &SessionConfig, media: Arc<dyn MediaSource>) -> Self {
        Self {
            signaling: Arc::new(WsSignalingTransport::new(config.signaling_url.clone())),
            links: Arc::new(RtcLinkFactory::new(config.transport())),
            media,
        }
    }
}

/// Handle to one joined call.
///
/// All work happens on a spawned session loop; this handle only sends it
/// commands. Dropping the handle ends the call like [`CallSession::leave`].
pub struct CallSession {
    room: RoomId,
    command_tx: mpsc::Sender<SessionCommand>,
    status_rx: watch::Receiver<CallStatus>,
    preview_rx: watch::Receiver<Option<LocalStream>>,
    remote_rx: watch::Receiver<Option<RemoteStream>>,
}

impl CallSession {
    /// Join `room`: connect to the relay and acquire local media concurrently,
    /// then start the session loop.
    ///
    /// If either step fails, whatever the other one acquired is released
    /// before the error is returned, so a later `join` starts clean.
    pub async fn join(room: &str, config: &SessionConfig, deps: SessionDeps) -> CallResult<Self> {
        let room = RoomId::parse(room).ok_or_else(|| CallError::InvalidRoom(room.to_owned()))?;
        info!("Joining room '{}'", room);

        let (channel, stream) = tokio::join!(
            deps.signaling.connect(&room),
            deps.media.user_media(config.media)
        );

        let (channel, stream) = match (channel, stream) {
            (Ok(channel), Ok(stream)) => (channel, stream),
            (Ok(channel), Err(e)) => {
                warn!("Media acquisition failed, leaving relay: {}", e);
                channel.output.close().await;
                return Err(e);
            }
            (Err(e), Ok(stream)) => {
                warn!("Relay connection failed, releasing media: {}", e);
                for track in &stream.tracks {
                    track.stop();
                }
                return Err(e);
            }
            (Err(signaling_err), Err(media_err)) => {
                warn!("Relay connection failed as well: {}", signaling_err);
                return Err(media_err);
            }
        };

        let mut tracks = TrackController::new();
        tracks.install(stream);

        let (command_tx, command_rx) = mpsc::channel(64);
        let (transport_tx, transport_rx) = mpsc::channel(256);
        let (status_tx, status_rx) = watch::channel(CallStatus {
            muted: tracks.is_muted(),
            video_off: tracks.is_video_off(),
            ..CallStatus::default()
        });
        let (preview_tx, preview_rx) = watch::channel(tracks.preview());
        let (remote_tx, remote_rx) = watch::channel(None);

        let engine = NegotiationEngine::new(deps.links, channel.output.clone(), transport_tx);
        let session_loop = SessionLoop::new(
            engine,
            tracks,
            deps.media,
            Teardown::new(channel.output),
            command_rx,
            command_tx.downgrade(),
            channel.events,
            transport_rx,
            SessionSinks {
                status: status_tx,
                preview: preview_tx,
                remote: remote_tx,
            },
        );
        tokio::spawn(session_loop.run());

        Ok(Self {
            room,
            command_tx,
            status_rx,
            preview_rx,
            remote_rx,
        })
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Tear the call down. Safe to call repeatedly or after the call already
    /// ended on its own.
    pub async fn leave(&self) -> CallResult<()> {
        let (tx, rx) = oneshot::channel();
        if self.command_tx.send(SessionCommand::Leave(tx)).await.is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    /// Returns whether the microphone is now muted.
    pub async fn toggle_mute(&self) -> bool {
        self.request(SessionCommand::ToggleMute)
            .await
            .unwrap_or_else(|| self.status_rx.borrow().muted)
    }

    /// Returns whether the camera is now off.
    pub async fn toggle_video(&self) -> bool {
        self.request(SessionCommand::ToggleVideo)
            .await
            .unwrap_or_else(|| self.status_rx.borrow().video_off)
    }

    /// Returns whether the screen is now being shared. A refused display
    /// picker leaves sharing off and the call untouched.
    pub async fn toggle_share(&self) -> bool {
        self.request(SessionCommand::ToggleShare)
            .await
            .unwrap_or(false)
    }

    pub async fn negotiation_state(&self) -> NegotiationState {
        self.request(SessionCommand::NegotiationState)
            .await
            .unwrap_or(NegotiationState::Idle)
    }

    pub fn status(&self) -> watch::Receiver<CallStatus> {
        self.status_rx.clone()
    }

    /// What the local preview should render; `None` once the call is over.
    pub fn local_preview(&self) -> watch::Receiver<Option<LocalStream>> {
        self.preview_rx.clone()
    }

    pub fn remote_playback(&self) -> watch::Receiver<Option<RemoteStream>> {
        self.remote_rx.clone()
    }

    /// `None` when the session loop is gone.
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(make(tx)).await.ok()?;
        rx.await.ok()
    }
}
