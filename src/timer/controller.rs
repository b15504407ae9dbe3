use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::store::KeyValueStore;

use super::{
    clock::TimeSource,
    persist::{load_config, save_config, PersistedClockConfig},
    state::{ClockState, Phase},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClockSnapshot {
    pub state: ClockState,
    pub is_running: bool,
    pub target_ms: u64,
    pub remaining_ms: u64,
    pub overtime_ms: u64,
    pub is_overtime: bool,
    pub progress_percent: f64,
}

impl ClockSnapshot {
    pub fn from_state(state: &ClockState) -> Self {
        Self {
            state: state.clone(),
            is_running: state.is_running(),
            target_ms: state.target_ms(),
            remaining_ms: state.remaining_ms(),
            overtime_ms: state.overtime_ms(),
            is_overtime: state.is_overtime(),
            progress_percent: state.progress_percent(),
        }
    }
}

/// Handle to the refresh task. Dropping it cancels the task.
struct Ticker {
    _guard: DropGuard,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Ticker {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

/// The one session clock of a running application. Clones share state.
///
/// Lock order is always `persist` then `ticker` then `state`; the refresh
/// task only ever takes `state`. Configuration changes hold `persist` until
/// their write returns, so the store sees them in the order they were made.
#[derive(Clone)]
pub struct ClockController {
    state: Arc<Mutex<ClockState>>,
    time_source: Arc<dyn TimeSource>,
    store: Arc<dyn KeyValueStore>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    persist: Arc<Mutex<()>>,
    refresh_interval: Duration,
    updates: Arc<watch::Sender<ClockSnapshot>>,
}

impl ClockController {
    pub fn new(
        state: ClockState,
        time_source: Arc<dyn TimeSource>,
        store: Arc<dyn KeyValueStore>,
        refresh_interval: Duration,
    ) -> Self {
        let (updates, _) = watch::channel(ClockSnapshot::from_state(&state));
        Self {
            state: Arc::new(Mutex::new(state)),
            time_source,
            store,
            ticker: Arc::new(Mutex::new(None)),
            persist: Arc::new(Mutex::new(())),
            refresh_interval: refresh_interval.max(Duration::from_millis(1)),
            updates: Arc::new(updates),
        }
    }

    /// Builds the clock from the persisted phase and targets; run state
    /// always starts idle.
    pub async fn restore(
        time_source: Arc<dyn TimeSource>,
        store: Arc<dyn KeyValueStore>,
        refresh_interval: Duration,
    ) -> Self {
        let config = load_config(store.as_ref()).await;
        log_info!(
            "Clock restored in {} phase (targets {}/{}/{} min)",
            config.phase,
            config.phase_durations.discovery,
            config.phase_durations.drilling,
            config.phase_durations.integration
        );
        Self::new(config.into_state(), time_source, store, refresh_interval)
    }

    pub fn subscribe(&self) -> watch::Receiver<ClockSnapshot> {
        self.updates.subscribe()
    }

    pub async fn snapshot(&self) -> ClockSnapshot {
        let mut guard = self.state.lock().await;
        guard.sync_elapsed(self.time_source.now_ms());
        ClockSnapshot::from_state(&guard)
    }

    pub async fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .map(Ticker::is_active)
            .unwrap_or(false)
    }

    pub async fn start(&self) -> ClockSnapshot {
        let mut ticker = self.ticker.lock().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            let was_running = state.start(self.time_source.now_ms());
            if was_running {
                log_debug!("Re-arming running clock at {} ms", state.elapsed_ms);
            } else {
                log_info!(
                    "Clock started in {} phase at {} ms",
                    state.phase,
                    state.elapsed_ms
                );
            }
            self.publish(&state)
        };

        // Replacing the slot drops (and cancels) any previous task.
        *ticker = Some(self.spawn_ticker());
        snapshot
    }

    /// Does nothing when the clock is not running.
    pub async fn stop(&self) -> ClockSnapshot {
        let mut ticker = self.ticker.lock().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            match state.stop(self.time_source.now_ms()) {
                Some(minutes) => {
                    log_info!(
                        "Clock stopped in {} phase, captured {} min",
                        state.phase,
                        minutes
                    );
                    self.publish(&state)
                }
                None => ClockSnapshot::from_state(&state),
            }
        };
        ticker.take();
        snapshot
    }

    pub async fn reset(&self) -> ClockSnapshot {
        let mut ticker = self.ticker.lock().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.reset() {
                log_info!("Clock reset while running");
            }
            self.publish(&state)
        };
        ticker.take();
        snapshot
    }

    pub async fn set_phase(&self, phase: Phase) -> ClockSnapshot {
        let _persist = self.persist.lock().await;
        let mut ticker = self.ticker.lock().await;
        let (snapshot, config) = {
            let mut state = self.state.lock().await;
            let previous = state.phase;
            if state.set_phase(phase, self.time_source.now_ms()) {
                log_info!("Stopped running clock to switch {previous} -> {phase}");
            }
            (self.publish(&state), PersistedClockConfig::from_state(&state))
        };
        ticker.take();
        drop(ticker);

        self.save(&config).await;
        snapshot
    }

    pub async fn set_phase_duration(&self, phase: Phase, minutes: u32) -> ClockSnapshot {
        let _persist = self.persist.lock().await;
        let (snapshot, config) = {
            let mut state = self.state.lock().await;
            state.set_phase_duration(phase, minutes);
            state.sync_elapsed(self.time_source.now_ms());
            (self.publish(&state), PersistedClockConfig::from_state(&state))
        };
        log_info!("Target for {phase} set to {minutes} min");

        self.save(&config).await;
        snapshot
    }

    /// Returns the captured minutes and clears them, so exactly one consumer
    /// receives each capture.
    pub async fn take_captured_minutes(&self) -> Option<f64> {
        let mut state = self.state.lock().await;
        let taken = state.take_captured_minutes();
        if taken.is_some() {
            self.publish(&state);
        }
        taken
    }

    /// Cancels the refresh task and waits for it to finish.
    pub async fn shutdown(&self) {
        let ticker = self.ticker.lock().await.take();
        if let Some(Ticker { cancel, handle, .. }) = ticker {
            cancel.cancel();
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    log_warn!("Clock refresh task ended abnormally: {err}");
                }
            }
        }
    }

    fn publish(&self, state: &ClockState) -> ClockSnapshot {
        let snapshot = ClockSnapshot::from_state(state);
        self.updates.send_replace(snapshot.clone());
        snapshot
    }

    async fn save(&self, config: &PersistedClockConfig) {
        if let Err(err) = save_config(self.store.as_ref(), config).await {
            log_warn!("Clock configuration not saved: {err:#}");
        }
    }

    fn spawn_ticker(&self) -> Ticker {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(refresh_loop(
            self.state.clone(),
            self.time_source.clone(),
            self.updates.clone(),
            self.refresh_interval,
            cancel.clone(),
        ));

        Ticker {
            _guard: cancel.clone().drop_guard(),
            cancel,
            handle,
        }
    }
}

async fn refresh_loop(
    state: Arc<Mutex<ClockState>>,
    time_source: Arc<dyn TimeSource>,
    updates: Arc<watch::Sender<ClockSnapshot>>,
    refresh_interval: Duration,
    cancel: CancellationToken,
) {
    let mut interval = time::interval(refresh_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let mut guard = state.lock().await;
                if !guard.is_running() {
                    break;
                }
                guard.sync_elapsed(time_source.now_ms());
                updates.send_replace(ClockSnapshot::from_state(&guard));
            }
        }
    }

    log_debug!("Clock refresh task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::MemoryStore,
        timer::{clock::ManualTimeSource, persist::STORE_KEY, state::ClockStatus},
    };
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Notify;

    struct BrokenStore;

    /// Holds back any write whose integration target is still 10 minutes.
    struct SlowStore {
        inner: MemoryStore,
        delayed_write_started: Notify,
    }

    #[async_trait]
    impl KeyValueStore for SlowStore {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: Value) -> Result<()> {
            if value["phaseDurations"]["integration"] == json!(10) {
                self.delayed_write_started.notify_one();
                time::sleep(Duration::from_secs(1)).await;
            }
            self.inner.put(key, value).await
        }
    }

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Value>> {
            Err(anyhow!("disk unavailable"))
        }

        async fn put(&self, _key: &str, _value: Value) -> Result<()> {
            Err(anyhow!("disk unavailable"))
        }
    }

    async fn controller_with(store: Arc<dyn KeyValueStore>) -> (ClockController, ManualTimeSource) {
        let time = ManualTimeSource::new(1_700_000_000_000);
        let controller =
            ClockController::restore(Arc::new(time.clone()), store, DEFAULT_REFRESH_INTERVAL).await;
        (controller, time)
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_publishes_elapsed_while_running() {
        let (controller, time) = controller_with(Arc::new(MemoryStore::new())).await;
        controller.start().await;
        assert!(controller.is_ticking().await);

        let mut rx = controller.subscribe();
        rx.borrow_and_update();

        time.advance_ms(1_500);
        time::sleep(Duration::from_millis(50)).await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().state.elapsed_ms, 1_500);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_while_running_leaves_no_ticker_behind() {
        let (controller, time) = controller_with(Arc::new(MemoryStore::new())).await;
        controller.start().await;
        time.advance_ms(30_000);

        let snapshot = controller.reset().await;
        assert!(!snapshot.is_running);
        assert_eq!(snapshot.state.elapsed_ms, 0);
        assert!(!controller.is_ticking().await);

        let mut rx = controller.subscribe();
        rx.borrow_and_update();
        time.advance_ms(60_000);
        time::sleep(Duration::from_millis(200)).await;

        assert!(!rx.has_changed().unwrap());
        assert_eq!(controller.snapshot().await.state.elapsed_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_while_running_replaces_ticker() {
        let (controller, time) = controller_with(Arc::new(MemoryStore::new())).await;
        controller.start().await;
        time.advance_ms(4_000);

        let snapshot = controller.start().await;
        assert!(snapshot.is_running);
        assert_eq!(snapshot.state.elapsed_ms, 4_000);
        assert!(controller.is_ticking().await);

        time.advance_ms(1_000);
        assert_eq!(controller.stop().await.state.elapsed_ms, 5_000);
        assert!(!controller.is_ticking().await);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_twice_keeps_first_capture() {
        let (controller, time) = controller_with(Arc::new(MemoryStore::new())).await;
        controller.start().await;
        time.advance_ms(90_000);

        let first = controller.stop().await;
        assert_eq!(first.state.captured_minutes, Some(1.5));

        let mut rx = controller.subscribe();
        rx.borrow_and_update();
        time.advance_ms(90_000);

        let second = controller.stop().await;
        assert_eq!(second.state.captured_minutes, Some(1.5));
        assert_eq!(second.state.elapsed_ms, 90_000);
        assert_eq!(second.state.status, ClockStatus::Stopped);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn captured_minutes_are_claimed_once() {
        let (controller, time) = controller_with(Arc::new(MemoryStore::new())).await;
        controller.start().await;
        time.advance_minutes(3);
        controller.stop().await;

        assert_eq!(controller.take_captured_minutes().await, Some(3.0));
        assert_eq!(controller.take_captured_minutes().await, None);
        assert_eq!(controller.snapshot().await.state.elapsed_ms, 180_000);
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_is_persisted_without_run_state() {
        let store = Arc::new(MemoryStore::new());
        let (controller, time) = controller_with(store.clone()).await;

        controller.set_phase_duration(Phase::Drilling, 25).await;
        controller.set_phase(Phase::Drilling).await;
        controller.start().await;
        time.advance_minutes(2);
        controller.stop().await;

        assert_eq!(
            store.get(STORE_KEY).await.unwrap(),
            Some(json!({
                "phase": "drilling",
                "phaseDurations": {"discovery": 10, "drilling": 25, "integration": 10}
            }))
        );

        let (restored, _) = controller_with(store).await;
        let snapshot = restored.snapshot().await;
        assert_eq!(snapshot.state.phase, Phase::Drilling);
        assert_eq!(snapshot.state.phase_durations.drilling, 25);
        assert_eq!(snapshot.state.status, ClockStatus::Idle);
        assert_eq!(snapshot.state.captured_minutes, None);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_config_changes_reach_store_in_order() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delayed_write_started: Notify::new(),
        });
        let (controller, _) = controller_with(store.clone()).await;

        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.set_phase_duration(Phase::Drilling, 25).await })
        };
        store.delayed_write_started.notified().await;

        let second = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.set_phase_duration(Phase::Integration, 7).await })
        };
        first.await.unwrap();
        second.await.unwrap();

        let in_memory = controller.snapshot().await.state.phase_durations;
        let on_disk = store.get(STORE_KEY).await.unwrap().unwrap();
        assert_eq!(in_memory.drilling, 25);
        assert_eq!(in_memory.integration, 7);
        assert_eq!(on_disk["phaseDurations"]["drilling"], json!(25));
        assert_eq!(on_disk["phaseDurations"]["integration"], json!(7));
    }

    #[tokio::test(start_paused = true)]
    async fn broken_store_is_not_fatal() {
        let (controller, _) = controller_with(Arc::new(BrokenStore)).await;
        assert_eq!(controller.snapshot().await.state, ClockState::new());

        let snapshot = controller.set_phase(Phase::Integration).await;
        assert_eq!(snapshot.state.phase, Phase::Integration);

        let snapshot = controller.set_phase_duration(Phase::Integration, 8).await;
        assert_eq!(snapshot.target_ms, 8 * 60_000);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_last_handle_ends_refresh_task() {
        let (controller, _) = controller_with(Arc::new(MemoryStore::new())).await;
        controller.start().await;
        let mut rx = controller.subscribe();

        drop(controller);

        let drained = time::timeout(Duration::from_secs(1), async {
            while rx.changed().await.is_ok() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_refresh_task() {
        let (controller, _) = controller_with(Arc::new(MemoryStore::new())).await;
        controller.start().await;
        controller.shutdown().await;
        assert!(!controller.is_ticking().await);
    }
}
