use crate::error::{CallError, CallResult};
use crate::media::MediaConstraints;
use crate::transport::TransportConfig;
use duet_core::IceServerConfig;
use serde::Deserialize;
use std::path::Path;

/// Everything a session needs before it can join a room.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub signaling_url: String,
    pub ice_servers: Vec<IceServerConfig>,
    pub media: MediaConstraints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://127.0.0.1:3000/ws".to_owned(),
            ice_servers: Vec::new(),
            media: MediaConstraints::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(raw: &str) -> CallResult<Self> {
        serde_json::from_str(raw).map_err(|e| CallError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> CallResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CallError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig::new(self.ice_servers.clone())
    }
}
