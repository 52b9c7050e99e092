//! Retry scheduler.
//!
//! Drives periodic flush passes with exponential backoff. The wait before
//! pass `k` is `min(interval * 2^(k-1), max_delay)`; at most `max_cycles`
//! passes run, and the scheduler stops early once a pass leaves the queue
//! empty. At most one timer task is alive at a time.

use fanos_config_and_utils::{diag, FanosConfig};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Never started, or cancelled.
    Idle,
    /// Waiting to run pass `n` (1-based).
    Scheduled(u32),
    /// Gave up: the queue drained or the cycle bound was reached.
    Stopped,
}

/// Backoff parameters read from the configuration when scheduling starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_delay: Duration,
    pub max_cycles: u32,
    pub debug: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &FanosConfig) -> Self {
        Self {
            interval: config.retry_interval(),
            max_delay: config.effective_max_retry_delay(),
            max_cycles: config.effective_max_retry_cycles(),
            debug: config.debug,
        }
    }

    /// Wait before pass `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        compute_backoff(attempt, self.interval, self.max_delay)
    }
}

/// `min(base * 2^(attempt-1), max)`, saturating. Attempt 0 yields zero.
pub fn compute_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let max_ms = max.as_millis().min(u64::MAX as u128) as u64;
    let shift = attempt.saturating_sub(1);
    let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(multiplier).min(max_ms);

    Duration::from_millis(delay_ms)
}

#[derive(Debug)]
struct Shared {
    state: SchedulerState,
    /// Bumped on every start/cancel so a superseded task never writes state.
    generation: u64,
}

/// Owns the retry timer task.
#[derive(Debug)]
pub struct RetryScheduler {
    shared: Arc<Mutex<Shared>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: SchedulerState::Idle,
                generation: 0,
            })),
            task: Mutex::new(None),
        }
    }
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.lock().state
    }

    /// Cancel any outstanding timer and start again from pass 1.
    ///
    /// `policy` is read again before every wait and after every pass, so
    /// configuration changes reach a running schedule. `pass` runs one flush
    /// and returns how many requests remain queued. Must be called from
    /// within a tokio runtime; otherwise the scheduler stays idle.
    pub fn start<P, F, Fut>(&self, policy: P, pass: F)
    where
        P: Fn() -> RetryPolicy + Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = usize> + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "No async runtime, retries disabled");
                self.cancel();
                return;
            }
        };

        let generation = {
            let mut shared = self.shared.lock();
            shared.generation += 1;
            shared.state = SchedulerState::Scheduled(1);
            shared.generation
        };

        let initial = policy();
        diag!(
            initial.debug,
            delay_ms = initial.delay_for(1).as_millis() as u64,
            max_cycles = initial.max_cycles,
            "Retry scheduling started"
        );

        let shared = self.shared.clone();
        let handle = runtime.spawn(async move {
            let mut attempt = 1u32;
            loop {
                tokio::time::sleep(policy().delay_for(attempt)).await;

                let remaining = pass().await;
                let current = policy();
                let next = if remaining == 0 {
                    diag!(current.debug, attempt, "Queue is empty, stopping retries");
                    SchedulerState::Stopped
                } else if attempt.saturating_add(1) > current.max_cycles {
                    diag!(
                        current.debug,
                        attempt,
                        remaining,
                        "Max retry cycles reached, stopping retries"
                    );
                    SchedulerState::Stopped
                } else {
                    SchedulerState::Scheduled(attempt + 1)
                };

                {
                    let mut guard = shared.lock();
                    if guard.generation != generation {
                        return;
                    }
                    guard.state = next;
                }

                match next {
                    SchedulerState::Scheduled(n) => {
                        diag!(
                            current.debug,
                            attempt = n,
                            delay_ms = current.delay_for(n).as_millis() as u64,
                            remaining,
                            "Next retry scheduled"
                        );
                        attempt = n;
                    }
                    _ => return,
                }
            }
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Abort the timer and return to `Idle`.
    pub fn cancel(&self) {
        {
            let mut shared = self.shared.lock();
            shared.generation += 1;
            shared.state = SchedulerState::Idle;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
