use crate::media::{LocalTrack, TrackKind};
use crate::transport::peer_link::{LinkFactory, PeerLink};
use crate::transport::transport_config::TransportConfig;
use crate::transport::transport_event::{LinkState, TransportEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use duet_core::{IceCandidate, PeerId, SdpType, SessionDescription};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// `PeerLink` backed by a `webrtc` peer connection.
pub struct ConnectionWrapper {
    pub peer_id: PeerId,
    pub peer_connection: Arc<RTCPeerConnection>,
    video_sender: Mutex<Option<Arc<RTCRtpSender>>>,
    closed: AtomicBool,
}

impl ConnectionWrapper {
    /// Build a peer connection for `peer_id`. Everything the connection
    /// reports asynchronously is pushed into `event_tx`.
    pub async fn new(
        peer_id: PeerId,
        config: TransportConfig,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = Arc::new(
            api.new_peer_connection(config.to_rtc_configuration())
                .await
                .context("Failed to create peer connection")?,
        );

        let state_tx = event_tx.clone();
        let uid_state = peer_id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let uid = uid_state.clone();

                Box::pin(async move {
                    info!("Peer connection state changed for {}: {:?}", uid, s);
                    let state = match s {
                        RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => {
                            LinkState::New
                        }
                        RTCPeerConnectionState::Connecting => LinkState::Connecting,
                        RTCPeerConnectionState::Connected => LinkState::Connected,
                        RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                            LinkState::Failed
                        }
                        RTCPeerConnectionState::Closed => LinkState::Closed,
                    };
                    let _ = tx.send(TransportEvent::StateChanged(uid, state)).await;
                })
            },
        ));

        // Trickle ICE: every gathered candidate goes straight to the session.
        let ice_tx = event_tx.clone();
        let uid_ice = peer_id.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let uid = uid_ice.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_m_line_index: init.sdp_mline_index,
                    sdp_mid: init.sdp_mid,
                };
                let _ = tx
                    .send(TransportEvent::CandidateGenerated(uid, candidate))
                    .await;
            })
        }));

        let track_tx = event_tx;
        let uid_track = peer_id.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                let uid = uid_track.clone();

                Box::pin(async move {
                    debug!("Remote {:?} track from {}", track.kind(), uid);
                    let _ = tx.send(TransportEvent::RemoteTrack(uid, track)).await;
                })
            },
        ));

        Ok(Self {
            peer_id,
            peer_connection,
            video_sender: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// RTCP has to be read off every sender or the interceptors stall.
    fn drain_rtcp(&self, sender: Arc<RTCRtpSender>) {
        let uid = self.peer_id.clone();
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = sender.read(&mut rtcp_buf).await {}
            debug!("RTCP reader for {} stopped", uid);
        });
    }
}

#[async_trait]
impl PeerLink for ConnectionWrapper {
    async fn create_offer(&self) -> Result<String> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .context("Failed to set local offer")?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await
            .context("Failed to set local answer")?;
        Ok(answer.sdp)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = match desc.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
        };
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn rollback_local_offer(&self) -> Result<()> {
        let pending = self
            .peer_connection
            .pending_local_description()
            .await
            .context("No local offer to roll back")?;

        let mut rollback = RTCSessionDescription::default();
        rollback.sdp_type = RTCSdpType::Rollback;
        rollback.sdp = pending.sdp;
        self.peer_connection
            .set_local_description(rollback)
            .await
            .context("Failed to roll back local offer")?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn add_track(&self, track: &LocalTrack) -> Result<()> {
        let sender = self
            .peer_connection
            .add_track(track.rtc())
            .await
            .with_context(|| format!("Failed to add {} track", track.kind()))?;

        if track.kind() == TrackKind::Video {
            *self.video_sender.lock().await = Some(sender.clone());
        }
        self.drain_rtcp(sender);
        Ok(())
    }

    async fn replace_video_track(&self, track: &LocalTrack) -> Result<()> {
        let sender = self.video_sender.lock().await.clone();
        let Some(sender) = sender else {
            anyhow::bail!("No video sender attached");
        };
        sender
            .replace_track(Some(track.rtc()))
            .await
            .context("Failed to replace video track")?;
        Ok(())
    }

    async fn remove_video_track(&self) -> Result<()> {
        let Some(sender) = self.video_sender.lock().await.take() else {
            return Ok(());
        };
        self.peer_connection.remove_track(&sender).await?;
        Ok(())
    }

    async fn has_video_sender(&self) -> bool {
        self.video_sender.lock().await.is_some()
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Opens a fresh `ConnectionWrapper` for each bound peer.
#[derive(Clone, Default)]
pub struct RtcLinkFactory {
    config: TransportConfig,
}

impl RtcLinkFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LinkFactory for RtcLinkFactory {
    async fn open(
        &self,
        peer_id: PeerId,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerLink>> {
        let link = ConnectionWrapper::new(peer_id.clone(), self.config.clone(), events).await;
        match link {
            Ok(link) => Ok(Arc::new(link)),
            Err(e) => {
                warn!("Failed to open peer connection for {}: {:?}", peer_id, e);
                Err(e)
            }
        }
    }
}
