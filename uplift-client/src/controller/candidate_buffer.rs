use std::collections::VecDeque;

/// FIFO of ICE candidates held until the remote description is applied.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: VecDeque<String>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: String) {
        self.pending.push_back(candidate);
    }

    /// Empties the buffer, yielding candidates in arrival order.
    pub fn drain(&mut self) -> impl Iterator<Item = String> + '_ {
        self.pending.drain(..)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
