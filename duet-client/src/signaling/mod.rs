mod local_relay;
mod signaling_output;
mod ws_transport;

pub use local_relay::LocalRelay;
pub use signaling_output::{SignalingChannel, SignalingEvent, SignalingOutput, SignalingTransport};
pub use ws_transport::WsSignalingTransport;
