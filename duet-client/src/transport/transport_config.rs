use duet_core::IceServerConfig;
use duet_core::utils::DEFAULT_STUN_ADDR;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;

/// Connectivity servers handed to every new peer connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl TransportConfig {
    /// An empty list falls back to the default public STUN server.
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        if ice_servers.is_empty() {
            return Self::default();
        }
        Self { ice_servers }
    }

    /// Config with no servers at all; only host candidates get gathered.
    pub fn host_only() -> Self {
        Self {
            ice_servers: Vec::new(),
        }
    }

    pub fn to_rtc_configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig::stun(DEFAULT_STUN_ADDR)],
        }
    }
}
