//! Traversal metrics.
//!
//! Lock-free atomic counters shared between the traversal manager, the
//! runtime driver and whoever reports on them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for traversal activity.
#[derive(Debug, Default)]
pub struct TraversalMetrics {
    /// Traversal calls started.
    pub traversals: AtomicU64,

    /// Calls that returned a document batch.
    pub batches: AtomicU64,

    /// Add documents handed out in batches.
    pub documents: AtomicU64,

    /// Delete documents handed out in batches.
    pub deletes: AtomicU64,

    /// Rounds in which every candidate was filtered out.
    pub empty_rounds: AtomicU64,

    /// Calls that ran out of time while still searching.
    pub pending: AtomicU64,

    /// Calls that found nothing new.
    pub caught_up: AtomicU64,

    /// Calls that failed.
    pub errors: AtomicU64,

    /// Repository queries issued by the traversal loop.
    pub queries: AtomicU64,

    /// Checkpoints committed by the runtime.
    pub checkpoints: AtomicU64,

    /// Candidate batch size used by the latest round.
    pub batch_size: AtomicU64,
}

impl TraversalMetrics {
    /// Creates new metrics with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the traversal call counter.
    pub fn inc_traversals(&self) {
        self.traversals.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a returned document batch.
    pub fn record_batch(&self, documents: u64, deletes: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.documents.fetch_add(documents, Ordering::Relaxed);
        self.deletes.fetch_add(deletes, Ordering::Relaxed);
    }

    /// Increments the empty round counter.
    pub fn inc_empty_rounds(&self) {
        self.empty_rounds.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the pending counter.
    pub fn inc_pending(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the caught-up counter.
    pub fn inc_caught_up(&self) {
        self.caught_up.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the error counter.
    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds to the query counter.
    pub fn inc_queries(&self, count: u64) {
        self.queries.fetch_add(count, Ordering::Relaxed);
    }

    /// Increments the checkpoint counter.
    pub fn inc_checkpoints(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    /// Sets the current batch size.
    pub fn set_batch_size(&self, size: u64) {
        self.batch_size.store(size, Ordering::Relaxed);
    }

    /// Returns a snapshot of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> TraversalMetricsSnapshot {
        TraversalMetricsSnapshot {
            traversals: self.traversals.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            documents: self.documents.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            empty_rounds: self.empty_rounds.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            caught_up: self.caught_up.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            batch_size: self.batch_size.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of traversal metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalMetricsSnapshot {
    /// Traversal calls started.
    pub traversals: u64,
    /// Calls that returned a document batch.
    pub batches: u64,
    /// Add documents handed out.
    pub documents: u64,
    /// Delete documents handed out.
    pub deletes: u64,
    /// Fully filtered rounds.
    pub empty_rounds: u64,
    /// Budget-exhausted calls.
    pub pending: u64,
    /// Calls that found nothing new.
    pub caught_up: u64,
    /// Failed calls.
    pub errors: u64,
    /// Repository queries.
    pub queries: u64,
    /// Committed checkpoints.
    pub checkpoints: u64,
    /// Latest batch size.
    pub batch_size: u64,
}
