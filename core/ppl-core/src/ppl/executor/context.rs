//! Per-query execution state: deadline, cancellation and memory budget.
//!
//! One context is created per execution and shared (`Arc`) by every
//! operator of the tree, including operators running on rayon tasks.

use crate::config::EngineConfig;
use crate::error::{PplError, PplResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Shared byte budget for aggregate states, hash tables and sort buffers.
#[derive(Debug)]
pub struct MemoryTracker {
    limit: usize,
    used: AtomicUsize,
}

impl MemoryTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn try_reserve(&self, bytes: usize) -> PplResult<()> {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(bytes);
            if next > self.limit {
                return Err(PplError::MemoryLimit {
                    requested: bytes,
                    used: current,
                    limit: self.limit,
                });
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Bytes held by one operator; returned to the tracker on drop.
#[derive(Debug)]
pub struct MemoryReservation {
    tracker: Arc<MemoryTracker>,
    bytes: usize,
}

impl MemoryReservation {
    pub fn new(tracker: Arc<MemoryTracker>) -> Self {
        Self { tracker, bytes: 0 }
    }

    /// Adds `bytes` to the reservation or fails with `MemoryLimit`.
    pub fn grow(&mut self, bytes: usize) -> PplResult<()> {
        self.tracker.try_reserve(bytes)?;
        self.bytes += bytes;
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.bytes
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.tracker.release(self.bytes);
        }
    }
}

/// 실행 컨텍스트: 쿼리당 하나
#[derive(Debug)]
pub struct ExecutionContext {
    started: Instant,
    deadline: Option<Instant>,
    cancelled: AtomicBool,
    /// Operators that ended in `Timeout`
    timed_out: AtomicUsize,
    memory: Arc<MemoryTracker>,
    max_groups: usize,
    page_size: usize,
}

impl ExecutionContext {
    pub fn new(config: &EngineConfig) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: config.query_timeout().map(|t| started + t),
            cancelled: AtomicBool::new(false),
            timed_out: AtomicUsize::new(0),
            memory: Arc::new(MemoryTracker::new(config.memory_limit_bytes)),
            max_groups: config.max_groups,
            page_size: config.page_size,
        }
    }

    /// Fails with `Timeout` once the deadline passed or the query was
    /// cancelled. Called before every pull.
    pub fn check(&self) -> PplResult<()> {
        if !self.cancelled.load(Ordering::Acquire) {
            match self.deadline {
                Some(deadline) if Instant::now() >= deadline => self.cancel(),
                _ => return Ok(()),
            }
        }
        Err(PplError::Timeout {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        })
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "query cancelled"
            );
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Records that one operator finished with `Timeout`.
    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::AcqRel);
    }

    pub fn timed_out_operators(&self) -> usize {
        self.timed_out.load(Ordering::Acquire)
    }

    /// Time left before the deadline; `None` when the query has no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn memory(&self) -> &Arc<MemoryTracker> {
        &self.memory
    }

    pub fn reservation(&self) -> MemoryReservation {
        MemoryReservation::new(Arc::clone(&self.memory))
    }

    pub fn max_groups(&self) -> usize {
        self.max_groups
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
