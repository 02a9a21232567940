use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation, checked once per polling iteration
pub trait QuitSignal {
    /// Must not block
    fn should_quit(&mut self) -> bool;
}

/// Shared quit flag
///
/// Clones observe the same flag, so one can be handed to a Ctrl-C handler
/// while another is polled by the acquisition loop.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl QuitSignal for StopFlag {
    fn should_quit(&mut self) -> bool {
        self.is_raised()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let mut flag = StopFlag::new();
        let handler = flag.clone();
        assert!(!flag.should_quit());

        handler.raise();
        assert!(flag.should_quit());

        flag.clear();
        assert!(!handler.is_raised());
    }
}
