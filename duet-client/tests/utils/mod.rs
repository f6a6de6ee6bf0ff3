pub mod helpers;

pub use helpers::*;
pub use mock_link::*;
pub use mock_signaling::*;
