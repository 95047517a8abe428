//! Observability module for metrics
//!
//! Metrics are emitted through the `metrics` facade; installing an exporter
//! is left to the application.
//!
//! ## Metrics Exposed:
//! - `featurehive_retrieval_duration_seconds` - Retrieval job latency histogram
//!   (setup, query and teardown)
//! - `featurehive_retrieval_errors_total` - Failed retrieval runs
//! - `featurehive_entity_rows_uploaded_total` - Entity rows inserted into staging tables
//! - `featurehive_entity_insert_chunks_total` - Multi-row INSERT statements issued
//! - `featurehive_staging_tables_leaked_total` - Staging tables left behind after a failure
//!
//! ## Usage:
//! ```rust
//! use featurehive_offline::observability::*;
//!
//! let _timer = time_retrieval();
//! // ... run the retrieval ...
//! drop(_timer); // Automatically records duration
//!
//! increment_rows_uploaded(1000);
//! ```

use metrics::{counter, histogram};
use std::time::Instant;

/// Timer for retrieval runs (auto-records on drop)
pub struct RetrievalTimer {
    start: Instant,
}

impl Default for RetrievalTimer {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl RetrievalTimer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Drop for RetrievalTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        histogram!("featurehive_retrieval_duration_seconds", duration);
    }
}

/// Start timing a retrieval run
pub fn time_retrieval() -> RetrievalTimer {
    RetrievalTimer::new()
}

/// Increment failed retrieval runs
pub fn increment_retrieval_errors() {
    counter!("featurehive_retrieval_errors_total", 1);
}

/// Increment entity rows inserted into staging tables
pub fn increment_rows_uploaded(count: usize) {
    counter!("featurehive_entity_rows_uploaded_total", count as u64);
}

/// Increment INSERT statements issued while staging
pub fn increment_insert_chunks(count: usize) {
    counter!("featurehive_entity_insert_chunks_total", count as u64);
}

/// Increment staging tables left behind on failure
pub fn increment_staging_tables_leaked() {
    counter!("featurehive_staging_tables_leaked_total", 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_drop_records() {
        let timer = time_retrieval();
        std::thread::sleep(std::time::Duration::from_millis(5));
        drop(timer);
    }

    #[test]
    fn test_counters_without_recorder() {
        // No recorder installed: every call is a no-op
        increment_retrieval_errors();
        increment_rows_uploaded(10);
        increment_insert_chunks(1);
        increment_staging_tables_leaked();
    }
}
