//! Context capacity pool
//!
//! The host can only sustain a bounded number of simultaneously open
//! contexts. The pool hands out one permit per running case:
//! - Admission is FIFO (fair semaphore)
//! - Permits release on drop, on every exit path
//! - Statistics for monitoring

use crate::error::PoolError;
use crate::types::{CaseId, TestCase};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Capacity ceiling
    pub max_size: usize,
    /// Total permits handed out
    pub total_acquired: usize,
    /// Currently running cases
    pub active_count: usize,
    /// Highest simultaneous active count observed
    pub peak_active: usize,
}

#[derive(Debug)]
struct PoolInner {
    max_size: usize,
    semaphore: Arc<Semaphore>,
    /// Running cases by ID, with their labels
    active: DashMap<CaseId, String>,
    active_count: AtomicUsize,
    total_acquired: AtomicUsize,
    peak_active: AtomicUsize,
}

/// Capacity-limited pool of context slots
#[derive(Debug, Clone)]
pub struct ContextPool {
    inner: Arc<PoolInner>,
}

impl ContextPool {
    /// Create new pool
    ///
    /// A zero ceiling is raised to one so the pool can make progress.
    #[inline]
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                max_size,
                semaphore: Arc::new(Semaphore::new(max_size)),
                active: DashMap::new(),
                active_count: AtomicUsize::new(0),
                total_acquired: AtomicUsize::new(0),
                peak_active: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a slot for `case`
    ///
    /// # Errors
    /// `PoolError::Closed` if the pool was closed while waiting.
    pub async fn acquire(&self, case: &TestCase) -> Result<ContextPermit, PoolError> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        self.inner.active.insert(case.id(), case.label().to_string());
        let now = self.inner.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_active.fetch_max(now, Ordering::SeqCst);
        self.inner.total_acquired.fetch_add(1, Ordering::SeqCst);

        Ok(ContextPermit {
            case_id: case.id(),
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Stop admitting cases; waiters fail with `PoolError::Closed`
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    /// Get pool statistics
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_size: self.inner.max_size,
            total_acquired: self.inner.total_acquired.load(Ordering::SeqCst),
            active_count: self.inner.active_count.load(Ordering::SeqCst),
            peak_active: self.inner.peak_active.load(Ordering::SeqCst),
        }
    }

    /// Labels of the cases currently holding a slot
    #[must_use]
    pub fn active_labels(&self) -> Vec<String> {
        self.inner
            .active
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Get capacity ceiling
    #[inline]
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }
}

/// One occupied slot; released on drop
#[derive(Debug)]
pub struct ContextPermit {
    case_id: CaseId,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl ContextPermit {
    #[inline]
    #[must_use]
    pub fn case_id(&self) -> CaseId {
        self.case_id
    }
}

impl Drop for ContextPermit {
    fn drop(&mut self) {
        self.inner.active.remove(&self.case_id);
        self.inner.active_count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixBuilder;
    use crate::types::LoaderKind;
    use std::time::Duration;

    fn cases() -> Vec<TestCase> {
        MatrixBuilder::default().build(LoaderKind::Paint)
    }

    #[tokio::test]
    async fn pool_acquire_and_release() {
        let pool = ContextPool::new(2);
        let cases = cases();

        let first = pool.acquire(&cases[0]).await.unwrap();
        let _second = pool.acquire(&cases[1]).await.unwrap();

        // Third acquire waits until a slot frees up
        let waiting =
            tokio::time::timeout(Duration::from_millis(20), pool.acquire(&cases[2])).await;
        assert!(waiting.is_err());

        drop(first);
        let third = pool.acquire(&cases[2]).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn pool_stats() {
        let pool = ContextPool::new(3);
        let cases = cases();

        let a = pool.acquire(&cases[0]).await.unwrap();
        let b = pool.acquire(&cases[1]).await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.active_count, 2);
        assert_eq!(stats.total_acquired, 2);
        assert_eq!(pool.active_labels().len(), 2);

        drop(a);
        drop(b);

        let stats = pool.stats();
        assert_eq!(stats.active_count, 0);
        assert_eq!(stats.peak_active, 2);
        assert!(pool.active_labels().is_empty());
    }

    #[tokio::test]
    async fn closed_pool_refuses_waiters() {
        let pool = ContextPool::new(1);
        let cases = cases();

        let _held = pool.acquire(&cases[0]).await.unwrap();
        pool.close();
        assert_eq!(pool.acquire(&cases[1]).await.unwrap_err(), PoolError::Closed);
    }

    #[test]
    fn zero_capacity_is_raised() {
        assert_eq!(ContextPool::new(0).max_size(), 1);
    }
}
