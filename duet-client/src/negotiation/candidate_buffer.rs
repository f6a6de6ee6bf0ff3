use duet_core::IceCandidate;
use std::collections::VecDeque;

/// Remote candidates that arrived before the remote description was applied.
///
/// Drained once, in arrival order. After that, `push` refuses and hands the
/// candidate back so the caller applies it directly.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    queue: VecDeque<IceCandidate>,
    drained: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: IceCandidate) -> Result<(), IceCandidate> {
        if self.drained {
            return Err(candidate);
        }
        self.queue.push_back(candidate);
        Ok(())
    }

    /// Take everything buffered. Later calls return nothing.
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.drained = true;
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }
}
