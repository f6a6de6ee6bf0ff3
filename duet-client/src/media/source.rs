use crate::error::{CallError, CallResult};
use crate::media::track::{LocalStream, LocalTrack, VideoSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use uuid::Uuid;

/// Which kinds of local media to capture when joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Capture provided by the host platform.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Camera and microphone.
    async fn user_media(&self, constraints: MediaConstraints) -> CallResult<LocalStream>;

    /// A display-capture video track.
    async fn display_media(&self) -> CallResult<LocalTrack>;
}

/// Produces real local tracks without touching any capture device.
///
/// Nothing is written into the tracks; the host (or a test) can push samples
/// into them if it wants media to flow.
#[derive(Debug, Default)]
pub struct SyntheticMediaSource {
    deny_user_media: AtomicBool,
    deny_display: AtomicBool,
}

impl SyntheticMediaSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behave as if camera/microphone permission was refused.
    pub fn deny_user_media(self) -> Self {
        self.deny_user_media.store(true, Ordering::SeqCst);
        self
    }

    /// Behave as if the user cancelled the display picker.
    pub fn deny_display(self) -> Self {
        self.deny_display.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_deny_display(&self, deny: bool) {
        self.deny_display.store(deny, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaSource for SyntheticMediaSource {
    async fn user_media(&self, constraints: MediaConstraints) -> CallResult<LocalStream> {
        if self.deny_user_media.load(Ordering::SeqCst) {
            return Err(CallError::MediaAcquisition(
                "camera/microphone permission denied".to_owned(),
            ));
        }
        if !constraints.audio && !constraints.video {
            return Err(CallError::MediaAcquisition(
                "at least one of audio or video must be requested".to_owned(),
            ));
        }

        let stream_id = format!("local-{}", Uuid::new_v4());
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(LocalTrack::audio(&stream_id));
        }
        if constraints.video {
            tracks.push(LocalTrack::video(VideoSource::Camera, &stream_id));
        }

        info!("Synthetic user media ready: {} track(s)", tracks.len());
        Ok(LocalStream::new(stream_id, tracks))
    }

    async fn display_media(&self) -> CallResult<LocalTrack> {
        if self.deny_display.load(Ordering::SeqCst) {
            return Err(CallError::MediaAcquisition(
                "display capture denied".to_owned(),
            ));
        }
        Ok(LocalTrack::video(
            VideoSource::Screen,
            &format!("screen-{}", Uuid::new_v4()),
        ))
    }
}
