mod source;
mod track;
mod track_controller;

pub use source::{MediaConstraints, MediaSource, SyntheticMediaSource};
pub use track::{LocalStream, LocalTrack, TrackKind, VideoSource};
pub use track_controller::{TrackChange, TrackController};
pub use webrtc::media::Sample;
