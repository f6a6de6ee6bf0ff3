use thiserror::Error;

/// Failures a call can run into.
///
/// Only `MediaAcquisition`, `SignalingTransport` and `Connectivity` ever end a
/// call. `NegotiationProtocol` is logged by the engine and the offending
/// message is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("media acquisition failed: {0}")]
    MediaAcquisition(String),

    #[error("signaling transport failed: {0}")]
    SignalingTransport(String),

    #[error("negotiation protocol error: {0}")]
    NegotiationProtocol(String),

    #[error("connectivity failed: {0}")]
    Connectivity(String),

    #[error("invalid room id: {0:?}")]
    InvalidRoom(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CallError {
    /// Whether this error terminates the call it occurred in.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CallError::NegotiationProtocol(_))
    }
}

pub type CallResult<T> = Result<T, CallError>;
