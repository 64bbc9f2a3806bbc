//! Logging utilities for the PPL engine
//!
//! Provides helpers for initializing tracing subscribers, plus the stage
//! timer the engine uses to report per-stage compile latency.

use std::time::Instant;

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging with default settings
///
/// # Environment Variables
/// - `RUST_LOG` - Log level filter (default: "info")
///
/// # Example
/// ```rust
/// ppl_core::logging::init();
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with a specific level
///
/// # Arguments
/// * `level` - Log level (trace, debug, info, warn, error)
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init();
}

/// Initialize logging for tests
///
/// Uses a more verbose format suitable for debugging tests.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("ppl_core=debug"))
        .with_test_writer()
        .try_init();
}

// Stub implementations when logging feature is disabled
#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}

/// Emits one `debug` event per finished compile stage.
pub(crate) struct StageTimer {
    started: Instant,
    last: Instant,
}

impl StageTimer {
    pub(crate) fn start() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last: now,
        }
    }

    /// Records the time since the previous mark under `stage`.
    pub(crate) fn mark(&mut self, stage: &'static str) {
        let now = Instant::now();
        tracing::debug!(
            stage,
            elapsed_us = now.duration_since(self.last).as_micros() as u64,
            "compile stage finished"
        );
        self.last = now;
    }

    pub(crate) fn total_us(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }
}
