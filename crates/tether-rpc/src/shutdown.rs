//! Cooperative shutdown flag shared between the transport, the dispatcher and
//! the host loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One-way flag raised when the server stops accepting work.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Returns true if this call was the one that raised it.
    #[expect(
        clippy::must_use_candidate,
        reason = "most callers only need the flag raised"
    )]
    pub fn trigger(&self) -> bool {
        !self.triggered.swap(true, Ordering::AcqRel)
    }

    /// Returns true once any clone has called [`ShutdownSignal::trigger`].
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_the_trigger() {
        let signal = ShutdownSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_triggered());
        assert!(signal.trigger());
        assert!(!signal.trigger(), "second trigger is a no-op");
        assert!(observer.is_triggered());
    }
}
