use crate::error::{CallError, CallResult};
use crate::media::{LocalStream, MediaSource, TrackChange, TrackController};
use crate::negotiation::NegotiationEngine;
use crate::session::session_command::SessionCommand;
use crate::session::status::{CallState, CallStatus, RemoteStream};
use crate::session::teardown::Teardown;
use crate::signaling::SignalingEvent;
use crate::transport::{LinkState, TransportEvent};
use duet_core::PeerId;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Outbound observers of a running call.
pub(crate) struct SessionSinks {
    pub status: watch::Sender<CallStatus>,
    pub preview: watch::Sender<Option<LocalStream>>,
    pub remote: watch::Sender<Option<RemoteStream>>,
}

/// One call's event loop. Owns the engine and the local media, so every
/// handler runs to completion before the next event is taken.
pub(crate) struct SessionLoop {
    engine: NegotiationEngine,
    tracks: TrackController,
    media: Arc<dyn MediaSource>,
    teardown: Teardown,
    command_rx: mpsc::Receiver<SessionCommand>,
    command_tx: mpsc::WeakSender<SessionCommand>,
    signaling_rx: mpsc::Receiver<SignalingEvent>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    sinks: SessionSinks,
    connected: bool,
}

impl SessionLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        engine: NegotiationEngine,
        tracks: TrackController,
        media: Arc<dyn MediaSource>,
        teardown: Teardown,
        command_rx: mpsc::Receiver<SessionCommand>,
        command_tx: mpsc::WeakSender<SessionCommand>,
        signaling_rx: mpsc::Receiver<SignalingEvent>,
        transport_rx: mpsc::Receiver<TransportEvent>,
        sinks: SessionSinks,
    ) -> Self {
        Self {
            engine,
            tracks,
            media,
            teardown,
            command_rx,
            command_tx,
            signaling_rx,
            transport_rx,
            sinks,
            connected: false,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Session event loop started");
        self.publish_status();

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Leave(reply)) => {
                            info!("Leaving the call");
                            self.end(None).await;
                            let _ = reply.send(());
                            break;
                        }
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Session handle dropped. Ending the call.");
                            self.end(None).await;
                            break;
                        }
                    }
                }

                evt = self.signaling_rx.recv() => {
                    let evt = evt.unwrap_or_else(|| {
                        SignalingEvent::Closed("relay event stream ended".to_owned())
                    });
                    if let Err(e) = self.handle_signaling_event(evt).await {
                        error!("Call failed: {}", e);
                        self.end(Some(e)).await;
                        break;
                    }
                }

                Some(evt) = self.transport_rx.recv() => {
                    if let Err(e) = self.handle_transport_event(evt).await {
                        error!("Call failed: {}", e);
                        self.end(Some(e)).await;
                        break;
                    }
                }
            }
        }

        info!("Session event loop finished");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::ToggleMute(reply) => {
                let muted = self.tracks.toggle_mute();
                debug!("Microphone {}", if muted { "muted" } else { "live" });
                self.publish_status();
                let _ = reply.send(muted);
            }

            SessionCommand::ToggleVideo(reply) => {
                let video_off = self.tracks.toggle_video();
                debug!("Camera {}", if video_off { "off" } else { "on" });
                self.publish_status();
                let _ = reply.send(video_off);
            }

            SessionCommand::ToggleShare(reply) => {
                let result = if self.tracks.is_sharing() {
                    self.tracks.stop_screen_share().await
                } else {
                    self.start_share().await
                };
                match result {
                    Ok(change) => self.after_track_change(change).await,
                    Err(e) => warn!("Screen share toggle failed: {}", e),
                }
                let _ = reply.send(self.tracks.is_sharing());
            }

            SessionCommand::ScreenShareEnded { track_id } => {
                if self.tracks.screen_track_id() != Some(track_id.as_str()) {
                    debug!("Stale end notice for display track {}", track_id);
                    return;
                }
                info!("Display track {} ended; restoring camera", track_id);
                match self.tracks.stop_screen_share().await {
                    Ok(change) => self.after_track_change(change).await,
                    Err(e) => warn!("Failed to restore camera after share ended: {}", e),
                }
            }

            SessionCommand::NegotiationState(reply) => {
                let _ = reply.send(self.engine.current_state());
            }

            SessionCommand::Leave(_) => {}
        }
    }

    async fn start_share(&mut self) -> CallResult<TrackChange> {
        let notify = self.command_tx.clone();
        let media = self.media.clone();
        self.tracks
            .start_screen_share(media.as_ref(), move |track_id| async move {
                if let Some(tx) = notify.upgrade() {
                    let _ = tx.send(SessionCommand::ScreenShareEnded { track_id }).await;
                }
            })
            .await
    }

    /// Publish the new outgoing media and renegotiate if a sender came or went.
    async fn after_track_change(&mut self, change: TrackChange) {
        if change == TrackChange::Structural {
            if let Err(e) = self.engine.renegotiate().await {
                warn!("Renegotiation after media change failed: {}", e);
            }
        }
        self.sinks.preview.send_replace(self.tracks.preview());
        self.publish_status();
    }

    async fn handle_signaling_event(&mut self, event: SignalingEvent) -> CallResult<()> {
        match event {
            SignalingEvent::Welcome(id) => {
                self.engine.set_local_id(id);
            }

            SignalingEvent::PeerJoined(peer_id) => {
                info!("{} joined the room", peer_id);
                let res = self.engine.on_peer_joined(peer_id, &mut self.tracks).await;
                self.check(res)?;
            }

            SignalingEvent::PeerLeft(peer_id) => {
                if self.engine.bound_peer() == Some(&peer_id) {
                    self.connected = false;
                    self.sinks.remote.send_replace(None);
                }
                self.engine.on_peer_left(&peer_id, &mut self.tracks).await;
            }

            SignalingEvent::Signal { from, payload } => {
                self.engine.on_signal(from, payload, &mut self.tracks).await?;
            }

            SignalingEvent::Closed(reason) => {
                return Err(CallError::SignalingTransport(reason));
            }
        }

        self.publish_status();
        Ok(())
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) -> CallResult<()> {
        match event {
            TransportEvent::CandidateGenerated(peer_id, candidate) => {
                self.engine.on_local_candidate(&peer_id, candidate).await?;
            }

            TransportEvent::StateChanged(peer_id, state) => {
                self.engine.on_link_state(&peer_id, state)?;
                if self.is_bound(&peer_id) {
                    self.connected = state == LinkState::Connected;
                    self.publish_status();
                }
            }

            TransportEvent::RemoteTrack(peer_id, track) => {
                if !self.is_bound(&peer_id) {
                    debug!("Ignoring remote track from unbound {}", peer_id);
                    return Ok(());
                }
                info!("Remote {:?} track from {}", track.kind(), peer_id);
                self.sinks.remote.send_modify(|remote| {
                    let stream = remote.get_or_insert_with(|| RemoteStream::new(peer_id.clone()));
                    if stream.peer_id != peer_id {
                        *stream = RemoteStream::new(peer_id.clone());
                    }
                    stream.tracks.push(track);
                });
            }
        }
        Ok(())
    }

    fn is_bound(&self, peer_id: &PeerId) -> bool {
        self.engine.bound_peer() == Some(peer_id)
    }

    /// Pass fatal errors through; log the rest.
    fn check(&self, res: CallResult<()>) -> CallResult<()> {
        match res {
            Err(e) if !e.is_fatal() => {
                warn!("{}", e);
                Ok(())
            }
            other => other,
        }
    }

    async fn end(&mut self, reason: Option<CallError>) {
        if !self.teardown.run(&mut self.engine, &mut self.tracks).await {
            return;
        }
        self.connected = false;
        self.sinks.preview.send_replace(None);
        self.sinks.remote.send_replace(None);
        self.sinks.status.send_modify(|status| {
            status.state = CallState::Ended(reason);
            status.sharing = false;
        });
    }

    fn publish_status(&self) {
        if self.teardown.is_done() {
            return;
        }
        let state = if self.engine.bound_peer().is_none() {
            CallState::WaitingForPeer
        } else if self.connected {
            CallState::Connected
        } else {
            CallState::Negotiating
        };
        let status = CallStatus {
            state,
            muted: self.tracks.is_muted(),
            video_off: self.tracks.is_video_off(),
            sharing: self.tracks.is_sharing(),
        };
        self.sinks.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}
