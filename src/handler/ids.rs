use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source owned by one backend (or one client)
///
/// Ids start at 1. Separate generators never share a sequence.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn last_id(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}
