//! Retry scheduling driven by the controller.

use super::harness::{test_config, TestHarness};
use crate::{SchedulerState, SendOptions};
use fanos_config_and_utils::{ConfigOverrides, FanosConfig};
use serde_json::json;
use std::time::Duration;

fn fast_retries(interval_ms: u64, max_delay_ms: u64, max_cycles: u32) -> FanosConfig {
    FanosConfig {
        retry_interval_ms: interval_ms,
        max_retry_delay_ms: max_delay_ms,
        max_retry_cycles: max_cycles,
        ..test_config()
    }
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn first_send_arms_the_scheduler() {
    let h = TestHarness::new();
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Idle);

    h.fanos.send(json!(1), SendOptions::new()).await.unwrap();

    assert!(h.fanos.is_initialized());
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Scheduled(1));
}

#[tokio::test(start_paused = true)]
async fn scheduled_pass_delivers_queued_request() {
    let h = TestHarness::failing();
    let _ = h.fanos.send(json!(1), SendOptions::new()).await;
    h.beacon.set_accept(true);

    advance(5_001).await;

    assert_eq!(h.fanos.queue_len(), 0);
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn passes_follow_exponential_backoff() {
    let h = TestHarness::with_config(fast_retries(1_000, 60_000, 10));
    h.beacon.set_accept(false);
    let _ = h.fanos.send(json!(1), SendOptions::new()).await;
    assert_eq!(h.beacon.sent_count(), 1);

    // Passes at t = 1000, 3000, 7000.
    advance(999).await;
    assert_eq!(h.beacon.sent_count(), 1);
    advance(2).await;
    assert_eq!(h.beacon.sent_count(), 2);
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Scheduled(2));

    advance(1_998).await;
    assert_eq!(h.beacon.sent_count(), 2);
    advance(2).await;
    assert_eq!(h.beacon.sent_count(), 3);

    advance(4_000).await;
    assert_eq!(h.beacon.sent_count(), 4);
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Scheduled(4));
}

#[tokio::test(start_paused = true)]
async fn delay_saturates_at_max_retry_delay() {
    let h = TestHarness::with_config(fast_retries(1_000, 1_500, 10));
    h.beacon.set_accept(false);
    let _ = h.fanos.send(json!(1), SendOptions::new()).await;

    // Passes at t = 1000, 2500, 4000, 5500.
    advance(1_001).await;
    assert_eq!(h.beacon.sent_count(), 2);
    advance(1_500).await;
    assert_eq!(h.beacon.sent_count(), 3);
    advance(1_500).await;
    assert_eq!(h.beacon.sent_count(), 4);
    advance(1_500).await;
    assert_eq!(h.beacon.sent_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn scheduler_gives_up_after_max_cycles() {
    let h = TestHarness::with_config(fast_retries(100, 1_000, 3));
    h.beacon.set_accept(false);
    let _ = h.fanos.send(json!(1), SendOptions::new()).await;

    advance(60_000).await;

    // One immediate send plus three scheduled passes.
    assert_eq!(h.beacon.sent_count(), 4);
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Stopped);
    // Flush-path failures never spend the attempt budget.
    assert_eq!(h.fanos.pending_requests()[0].attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn configured_cycle_bound_applies_to_running_schedule() {
    let h = TestHarness::with_config(fast_retries(100, 1_000, 10));
    h.beacon.set_accept(false);
    let _ = h.fanos.send(json!(1), SendOptions::new()).await;

    h.fanos.configure(&ConfigOverrides {
        max_retry_cycles: Some(1),
        ..Default::default()
    });
    advance(60_000).await;

    // One immediate send plus the single allowed pass.
    assert_eq!(h.beacon.sent_count(), 2);
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn configured_interval_applies_from_next_wait() {
    let h = TestHarness::with_config(fast_retries(1_000, 60_000, 10));
    h.beacon.set_accept(false);
    let _ = h.fanos.send(json!(1), SendOptions::new()).await;

    h.fanos.configure(&ConfigOverrides {
        retry_interval_ms: Some(100),
        ..Default::default()
    });

    // The wait already running keeps its delay; the next one is 100 * 2.
    advance(1_001).await;
    assert_eq!(h.beacon.sent_count(), 2);
    advance(200).await;
    assert_eq!(h.beacon.sent_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn zero_bounds_fall_back_to_defaults() {
    let h = TestHarness::with_config(fast_retries(10, 0, 0));
    h.beacon.set_accept(false);
    let _ = h.fanos.send(json!(1), SendOptions::new()).await;

    advance(3_600_000).await;

    // Default bound of ten cycles.
    assert_eq!(h.beacon.sent_count(), 11);
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn empty_queue_at_first_pass_stops() {
    let h = TestHarness::new();
    h.fanos.send(json!(1), SendOptions::new()).await.unwrap();

    advance(5_001).await;

    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Stopped);
    assert_eq!(h.beacon.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stopped_scheduler_restarts_on_reinitialization() {
    let h = TestHarness::with_config(fast_retries(100, 1_000, 2));
    h.beacon.set_accept(false);
    let _ = h.fanos.send(json!(1), SendOptions::new()).await;
    advance(10_000).await;
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Stopped);

    // Further sends on the same initialization do not re-arm.
    let _ = h.fanos.send(json!(2), SendOptions::new()).await;
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Stopped);

    h.fanos.destroy();
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Idle);

    let _ = h.fanos.send(json!(3), SendOptions::new()).await;
    assert_eq!(h.fanos.scheduler_state(), SchedulerState::Scheduled(1));
}
