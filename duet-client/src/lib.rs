pub mod config;
pub mod error;
pub mod media;
pub mod negotiation;
pub mod session;
pub mod signaling;
pub mod transport;

pub use config::SessionConfig;
pub use error::{CallError, CallResult};
pub use session::*;
