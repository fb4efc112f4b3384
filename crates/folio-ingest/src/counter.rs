//! Ingest progress counter
//!
//! One counter per run. Strategies increment it once per file unit that
//! finished (or, for deferred runs, was scheduled); anything else may only
//! read it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct IngestCounter {
    count: AtomicU64,
}

impl IngestCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add one; returns the new value
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn value(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Read-only handle for progress displays
    pub fn reader(self: &Arc<Self>) -> ProgressReader {
        ProgressReader(Arc::clone(self))
    }
}

#[derive(Debug, Clone)]
pub struct ProgressReader(Arc<IngestCounter>);

impl ProgressReader {
    pub fn value(&self) -> u64 {
        self.0.value()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        let counter = IngestCounter::new();
        assert_eq!(counter.value(), 0);
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.reader().value(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let counter = IngestCounter::new();
        let reader = counter.reader();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    for _ in 0..250 {
                        counter.increment();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(reader.value(), 2000);
    }
}
