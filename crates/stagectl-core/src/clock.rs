//! Time source and interruption flag shared by every blocking wait.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Abstraction over time for bounded waits.
///
/// Production code injects [`SystemClock`]. Tests inject a clock that
/// advances on `sleep` so timeouts are deterministic.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Block the caller for `duration`.
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Cooperative interruption flag, set from a signal handler.
///
/// Waits observe it between polls and return early; nothing already applied
/// is rolled back.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_is_shared_between_clones() {
        let interrupt = Interrupt::new();
        let handler_copy = interrupt.clone();
        assert!(!interrupt.is_triggered());
        handler_copy.trigger();
        assert!(interrupt.is_triggered());
    }
}
