//! Scenario tests for the delivery queue.
//!
//! - `harness.rs`     - recording beacon, scripted reliable sender, recording store
//! - `delivery.rs`    - immediate sends: beacon, split path, fallback, failure bookkeeping
//! - `flush.rs`       - flush passes: attempt budget, no attempt increments on retry
//! - `retry.rs`       - retry scheduler: backoff timing, cycle bound, restart
//! - `persistence.rs` - debounced writes, 100-entry cap, load and store failures
//! - `lifecycle.rs`   - lifecycle-triggered flushes, destroy, configure
//! - `global.rs`      - process-wide default instance

mod retry;
