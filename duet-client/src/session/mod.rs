mod call_session;
mod session_command;
mod session_loop;
mod status;
mod teardown;

pub use call_session::{CallSession, SessionDeps};
pub use session_command::SessionCommand;
pub use status::{CallState, CallStatus, RemoteStream};
pub use teardown::Teardown;
