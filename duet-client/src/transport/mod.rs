mod connection_wrapper;
mod peer_link;
mod transport_config;
mod transport_event;

pub use connection_wrapper::{ConnectionWrapper, RtcLinkFactory};
pub use peer_link::{LinkFactory, PeerLink};
pub use transport_config::TransportConfig;
pub use transport_event::{LinkState, TransportEvent};
