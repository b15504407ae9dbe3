//! Durable clock configuration. Only the selected phase and the per-phase
//! targets are written; run state always starts fresh.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::KeyValueStore;

use super::state::{ClockState, Phase, PhaseDurations};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const STORE_KEY: &str = "mastery-timer";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedClockConfig {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub phase_durations: PhaseDurations,
}

impl PersistedClockConfig {
    pub fn from_state(state: &ClockState) -> Self {
        Self {
            phase: state.phase,
            phase_durations: state.phase_durations,
        }
    }

    pub fn into_state(self) -> ClockState {
        ClockState::with_config(self.phase, self.phase_durations)
    }
}

/// Older blobs wrap the fields as `{"state": {...}, "version": n}`; both
/// shapes are accepted. A wrapped blob is judged by its `state` alone.
pub fn decode_config(value: Value) -> Result<PersistedClockConfig> {
    match value.get("state") {
        Some(state) => serde_json::from_value(state.clone())
            .context("unrecognized wrapped clock configuration"),
        None => serde_json::from_value(value).context("unrecognized clock configuration"),
    }
}

/// Never fails: a missing, unreadable or malformed entry yields defaults.
pub async fn load_config(store: &dyn KeyValueStore) -> PersistedClockConfig {
    let value = match store.get(STORE_KEY).await {
        Ok(Some(value)) => value,
        Ok(None) => return PersistedClockConfig::default(),
        Err(err) => {
            log_warn!("Failed to read clock configuration, using defaults: {err:#}");
            return PersistedClockConfig::default();
        }
    };

    decode_config(value).unwrap_or_else(|err| {
        log_warn!("Ignoring stored clock configuration: {err:#}");
        PersistedClockConfig::default()
    })
}

pub async fn save_config(store: &dyn KeyValueStore, config: &PersistedClockConfig) -> Result<()> {
    let value = serde_json::to_value(config)?;
    store
        .put(STORE_KEY, value)
        .await
        .context("failed to persist clock configuration")
}
