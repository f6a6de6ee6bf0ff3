use crate::error::{CallError, CallResult};
use crate::media::source::MediaSource;
use crate::media::track::{LocalStream, LocalTrack};
use crate::transport::PeerLink;
use std::sync::Arc;
use tracing::{info, warn};

/// What a screen-share operation did to the outgoing media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackChange {
    /// Nothing to do (already in the requested state).
    Unchanged,
    /// Only local state changed; no link is attached yet.
    LocalOnly,
    /// The video sender now carries a different source. No renegotiation.
    Substituted,
    /// A video sender was added or removed. The link needs renegotiation.
    Structural,
}

/// Owns the local media: camera/microphone stream and an optional screen share.
///
/// Mute and camera toggles only flip track enablement. Screen share swaps the
/// source of the existing video sender in place.
#[derive(Default)]
pub struct TrackController {
    camera: Option<LocalStream>,
    screen: Option<LocalTrack>,
    link: Option<Arc<dyn PeerLink>>,
}

impl TrackController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, stream: LocalStream) {
        info!("Installed local stream {} ({} tracks)", stream.id, stream.tracks.len());
        self.camera = Some(stream);
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        if let Some(track) = self.camera.as_ref().and_then(|s| s.audio()) {
            track.set_enabled(enabled);
        }
    }

    pub fn set_video_enabled(&self, enabled: bool) {
        if let Some(track) = self.camera.as_ref().and_then(|s| s.video()) {
            track.set_enabled(enabled);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.camera
            .as_ref()
            .and_then(|s| s.audio())
            .is_none_or(|t| !t.is_enabled())
    }

    pub fn is_video_off(&self) -> bool {
        self.camera
            .as_ref()
            .and_then(|s| s.video())
            .is_none_or(|t| !t.is_enabled())
    }

    /// Returns the new muted state.
    pub fn toggle_mute(&self) -> bool {
        let muted = !self.is_muted();
        self.set_audio_enabled(!muted);
        self.is_muted()
    }

    /// Returns the new video-off state.
    pub fn toggle_video(&self) -> bool {
        let video_off = !self.is_video_off();
        self.set_video_enabled(!video_off);
        self.is_video_off()
    }

    pub fn is_sharing(&self) -> bool {
        self.screen.is_some()
    }

    pub fn screen_track_id(&self) -> Option<&str> {
        self.screen.as_ref().map(|t| t.id())
    }

    /// The track the video sender should be carrying right now.
    pub fn outgoing_video(&self) -> Option<LocalTrack> {
        self.screen
            .clone()
            .or_else(|| self.camera.as_ref().and_then(|s| s.video().cloned()))
    }

    pub fn outgoing_tracks(&self) -> Vec<LocalTrack> {
        let mut tracks = Vec::new();
        if let Some(audio) = self.camera.as_ref().and_then(|s| s.audio()) {
            tracks.push(audio.clone());
        }
        if let Some(video) = self.outgoing_video() {
            tracks.push(video);
        }
        tracks
    }

    /// What the local preview should show.
    pub fn preview(&self) -> Option<LocalStream> {
        let camera = self.camera.as_ref()?;
        Some(LocalStream::new(camera.id.clone(), self.outgoing_tracks()))
    }

    /// Attach the outgoing tracks to a freshly opened link.
    pub async fn attach(&mut self, link: Arc<dyn PeerLink>) -> anyhow::Result<()> {
        for track in self.outgoing_tracks() {
            link.add_track(&track).await?;
        }
        self.link = Some(link);
        Ok(())
    }

    pub fn detach(&mut self) {
        self.link = None;
    }

    /// Acquire a display source and put it on the video sender.
    ///
    /// `on_ended` runs once when the display track ends, whoever ended it.
    pub async fn start_screen_share<F, Fut>(
        &mut self,
        source: &dyn MediaSource,
        on_ended: F,
    ) -> CallResult<TrackChange>
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.screen.is_some() {
            return Ok(TrackChange::Unchanged);
        }

        let track = source.display_media().await?;
        let change = match &self.link {
            None => TrackChange::LocalOnly,
            Some(link) => {
                let attached = if link.has_video_sender().await {
                    link.replace_video_track(&track)
                        .await
                        .map(|_| TrackChange::Substituted)
                } else {
                    link.add_track(&track).await.map(|_| TrackChange::Structural)
                };
                match attached {
                    Ok(change) => change,
                    Err(e) => {
                        warn!("Failed to attach display track: {:?}", e);
                        track.stop();
                        return Err(CallError::MediaAcquisition(format!(
                            "display track could not be attached: {}",
                            e
                        )));
                    }
                }
            }
        };

        let watched = track.clone();
        tokio::spawn(async move {
            watched.ended().await;
            on_ended(watched.id().to_owned()).await;
        });

        info!("Screen share started ({:?})", change);
        self.screen = Some(track);
        Ok(change)
    }

    /// Put the camera back on the video sender and release the display track.
    /// Safe to call when not sharing.
    pub async fn stop_screen_share(&mut self) -> CallResult<TrackChange> {
        let Some(screen) = self.screen.take() else {
            return Ok(TrackChange::Unchanged);
        };

        let camera_video = self.camera.as_ref().and_then(|s| s.video().cloned());
        let change = match (&self.link, camera_video) {
            (None, _) => TrackChange::LocalOnly,
            (Some(link), Some(camera)) => {
                if let Err(e) = link.replace_video_track(&camera).await {
                    warn!("Failed to restore camera track: {:?}", e);
                }
                TrackChange::Substituted
            }
            (Some(link), None) => {
                if let Err(e) = link.remove_video_track().await {
                    warn!("Failed to remove display track: {:?}", e);
                }
                TrackChange::Structural
            }
        };

        screen.stop();
        info!("Screen share stopped ({:?})", change);
        Ok(change)
    }

    /// Stop every local track. Returns how many tracks this call released.
    pub fn release_all(&mut self) -> usize {
        self.link = None;
        let mut released = 0;
        if let Some(screen) = self.screen.take() {
            released += usize::from(screen.stop());
        }
        if let Some(camera) = &self.camera {
            for track in &camera.tracks {
                released += usize::from(track.stop());
            }
        }
        released
    }
}
