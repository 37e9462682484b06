use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic request-generation counter.
///
/// A request captures the token returned by [`Generation::advance`]; its
/// response is only applied while that token is still current.
#[derive(Debug, Default)]
pub struct Generation(AtomicU64);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return its token
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.current() == token
    }
}
