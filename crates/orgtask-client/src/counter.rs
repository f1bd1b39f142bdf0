//! Live count of in-flight exchanges with the remote.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared handle to the number of exchanges still in flight.
///
/// Clones observe the same count, so the surrounding application can keep
/// one and warn before exiting while it is non-zero.
#[derive(Debug, Clone, Default)]
pub struct OutstandingCounter(Arc<AtomicUsize>);

impl OutstandingCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of exchanges started and not yet finished.
    #[must_use]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.get() == 0
    }

    /// Count one exchange until the returned guard drops.
    #[must_use]
    pub fn begin(&self) -> ExchangeGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        ExchangeGuard(self.clone())
    }
}

/// Decrements the counter on drop, whether the exchange succeeded or not.
#[derive(Debug)]
pub struct ExchangeGuard(OutstandingCounter);

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        (self.0).0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_counts_until_drop() {
        let counter = OutstandingCounter::new();
        let observer = counter.clone();

        let first = counter.begin();
        let second = counter.begin();
        assert_eq!(observer.get(), 2);

        drop(first);
        assert_eq!(observer.get(), 1);
        drop(second);
        assert!(observer.is_idle());
    }

    #[test]
    fn test_guard_drops_on_early_return() {
        fn failing(counter: &OutstandingCounter) -> Result<(), &'static str> {
            let _guard = counter.begin();
            Err("offline")
        }

        let counter = OutstandingCounter::new();
        assert!(failing(&counter).is_err());
        assert!(counter.is_idle());
    }
}
