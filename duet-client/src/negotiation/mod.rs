mod candidate_buffer;
mod engine;
mod state;

pub use candidate_buffer::CandidateBuffer;
pub use engine::NegotiationEngine;
pub use state::NegotiationState;
