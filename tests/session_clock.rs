use std::{sync::Arc, time::Duration};

use mastery_timer::{
    store::{JsonFileStore, MemoryStore},
    timer::{ClockController, ClockStatus, ManualTimeSource, Phase, DEFAULT_REFRESH_INTERVAL},
};

async fn clock() -> (ClockController, ManualTimeSource) {
    let time = ManualTimeSource::new(1_000_000);
    let controller = ClockController::restore(
        Arc::new(time.clone()),
        Arc::new(MemoryStore::new()),
        DEFAULT_REFRESH_INTERVAL,
    )
    .await;
    (controller, time)
}

#[tokio::test(start_paused = true)]
async fn discovery_overrun_is_captured_as_eleven_minutes() {
    let (clock, time) = clock().await;
    clock.start().await;

    time.advance_minutes(11);
    let running = clock.snapshot().await;
    assert!(running.is_running);
    assert!(running.is_overtime);
    assert_eq!(running.remaining_ms, 0);

    let stopped = clock.stop().await;
    assert_eq!(stopped.state.captured_minutes, Some(11.0));
    assert!(!stopped.is_running);
}

#[tokio::test(start_paused = true)]
async fn drilling_target_survives_phase_switch() {
    let (clock, _) = clock().await;
    clock.set_phase_duration(Phase::Drilling, 25).await;
    let snapshot = clock.set_phase(Phase::Drilling).await;

    assert_eq!(snapshot.state.phase_durations.drilling, 25);
    assert_eq!(snapshot.state.elapsed_ms, 0);
    assert_eq!(snapshot.target_ms, 25 * 60_000);
}

#[tokio::test(start_paused = true)]
async fn reset_while_running_goes_quiet() {
    let (clock, time) = clock().await;
    clock.start().await;
    time.advance_ms(12_345);
    clock.reset().await;

    let mut updates = clock.subscribe();
    updates.borrow_and_update();
    time.advance_minutes(5);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(!updates.has_changed().unwrap());
    let snapshot = clock.snapshot().await;
    assert!(!snapshot.is_running);
    assert_eq!(snapshot.state.elapsed_ms, 0);
    assert!(!clock.is_ticking().await);
}

#[tokio::test(start_paused = true)]
async fn repeated_stop_is_ignored() {
    let (clock, time) = clock().await;
    clock.start().await;
    time.advance_ms(150_000);
    clock.stop().await;
    time.advance_ms(150_000);

    let again = clock.stop().await;
    assert_eq!(again.state.captured_minutes, Some(2.5));
    assert_eq!(again.state.elapsed_ms, 150_000);
}

#[tokio::test(start_paused = true)]
async fn resumed_segments_accumulate() {
    let (clock, time) = clock().await;
    let mut previous = 0;
    for segment_ms in [30_000, 45_000, 5_000] {
        clock.start().await;
        time.advance_ms(segment_ms);
        let stopped = clock.stop().await;
        assert!(stopped.state.elapsed_ms >= previous);
        assert_eq!(stopped.state.elapsed_ms, previous + segment_ms as u64);
        previous = stopped.state.elapsed_ms;
        // Paused time between segments does not count.
        time.advance_minutes(1);
    }
    assert_eq!(clock.take_captured_minutes().await, Some(1.3));
}

#[tokio::test(start_paused = true)]
async fn captured_minutes_cleared_by_start_and_reset() {
    let (clock, time) = clock().await;
    clock.start().await;
    time.advance_minutes(1);
    clock.stop().await;

    assert_eq!(clock.start().await.state.captured_minutes, None);
    clock.stop().await;
    assert_eq!(clock.reset().await.state.captured_minutes, None);
}

#[tokio::test(start_paused = true)]
async fn set_phase_from_any_state_is_idle() {
    let (clock, time) = clock().await;

    let idle = clock.set_phase(Phase::Integration).await;

    clock.start().await;
    time.advance_ms(10_000);
    let from_running = clock.set_phase(Phase::Drilling).await;

    clock.start().await;
    time.advance_ms(10_000);
    clock.stop().await;
    let from_stopped = clock.set_phase(Phase::Discovery).await;

    for snapshot in [idle, from_running, from_stopped] {
        assert_eq!(snapshot.state.status, ClockStatus::Idle);
        assert_eq!(snapshot.state.elapsed_ms, 0);
        assert_eq!(snapshot.state.captured_minutes, None);
        assert!(!snapshot.is_running);
    }
    assert!(!clock.is_ticking().await);
}

#[tokio::test(start_paused = true)]
async fn configuration_restores_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let time = ManualTimeSource::new(0);

    {
        let store = Arc::new(JsonFileStore::new(path.clone()).unwrap());
        let clock =
            ClockController::restore(Arc::new(time.clone()), store, DEFAULT_REFRESH_INTERVAL).await;
        clock.set_phase_duration(Phase::Integration, 15).await;
        clock.set_phase(Phase::Integration).await;
        clock.start().await;
        time.advance_minutes(4);
        clock.stop().await;
    }

    let store = Arc::new(JsonFileStore::new(path).unwrap());
    let clock = ClockController::restore(Arc::new(time), store, DEFAULT_REFRESH_INTERVAL).await;
    let snapshot = clock.snapshot().await;
    assert_eq!(snapshot.state.phase, Phase::Integration);
    assert_eq!(snapshot.state.phase_durations.integration, 15);
    assert_eq!(snapshot.state.status, ClockStatus::Idle);
    assert_eq!(snapshot.state.elapsed_ms, 0);
    assert_eq!(snapshot.state.captured_minutes, None);
}
