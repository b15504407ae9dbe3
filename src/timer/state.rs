use serde::{Deserialize, Serialize};
use std::{cmp, fmt, str::FromStr};

use anyhow::{anyhow, Error};

pub const MS_PER_MINUTE: u64 = 60_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Discovery,
    Drilling,
    Integration,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Discovery => "discovery",
            Phase::Drilling => "drilling",
            Phase::Integration => "integration",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "discovery" => Ok(Phase::Discovery),
            "drilling" => Ok(Phase::Drilling),
            "integration" => Ok(Phase::Integration),
            other => Err(anyhow!("unknown phase '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ClockStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Target duration per phase, in whole minutes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PhaseDurations {
    pub discovery: u32,
    pub drilling: u32,
    pub integration: u32,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            discovery: 10,
            drilling: 20,
            integration: 10,
        }
    }
}

impl PhaseDurations {
    pub fn get(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Discovery => self.discovery,
            Phase::Drilling => self.drilling,
            Phase::Integration => self.integration,
        }
    }

    pub fn set(&mut self, phase: Phase, minutes: u32) {
        match phase {
            Phase::Discovery => self.discovery = minutes,
            Phase::Drilling => self.drilling = minutes,
            Phase::Integration => self.integration = minutes,
        }
    }

    pub fn target_ms(&self, phase: Phase) -> u64 {
        u64::from(self.get(phase)) * MS_PER_MINUTE
    }
}

/// Elapsed milliseconds rounded half-up to one decimal minute.
pub fn captured_minutes_from_ms(elapsed_ms: u64) -> f64 {
    let tenths = elapsed_ms.saturating_add(MS_PER_MINUTE / 20) / (MS_PER_MINUTE / 10);
    tenths as f64 / 10.0
}

/// The session clock. Every transition takes the caller's notion of "now"
/// (epoch milliseconds) so the machine itself never reads a clock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    pub phase: Phase,
    pub status: ClockStatus,
    pub elapsed_ms: u64,
    /// `now - elapsed_ms` at the moment the current run was armed, so a
    /// resumed run keeps accumulating on top of earlier segments.
    pub start_time_ms: Option<i64>,
    pub captured_minutes: Option<f64>,
    pub phase_durations: PhaseDurations,
}

impl Default for ClockState {
    fn default() -> Self {
        Self::with_config(Phase::default(), PhaseDurations::default())
    }
}

impl ClockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(phase: Phase, phase_durations: PhaseDurations) -> Self {
        Self {
            phase,
            status: ClockStatus::Idle,
            elapsed_ms: 0,
            start_time_ms: None,
            captured_minutes: None,
            phase_durations,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ClockStatus::Running
    }

    /// Elapsed time as of `now_ms`, without mutating the state.
    pub fn elapsed_at(&self, now_ms: i64) -> u64 {
        match (self.status, self.start_time_ms) {
            (ClockStatus::Running, Some(start)) => {
                let since_start = u64::try_from(now_ms.saturating_sub(start)).unwrap_or(0);
                cmp::max(self.elapsed_ms, since_start)
            }
            _ => self.elapsed_ms,
        }
    }

    pub fn sync_elapsed(&mut self, now_ms: i64) {
        self.elapsed_ms = self.elapsed_at(now_ms);
    }

    /// Arms the clock. Calling it while already running re-anchors without
    /// losing elapsed time. Returns `true` when the clock was already running.
    pub fn start(&mut self, now_ms: i64) -> bool {
        let was_running = self.is_running();
        self.sync_elapsed(now_ms);
        self.start_time_ms = Some(now_ms.saturating_sub(self.elapsed_ms as i64));
        self.status = ClockStatus::Running;
        self.captured_minutes = None;
        was_running
    }

    /// Freezes elapsed time and captures it in minutes. No-op (returns `None`)
    /// when the clock is not running, leaving any earlier capture untouched.
    pub fn stop(&mut self, now_ms: i64) -> Option<f64> {
        if !self.is_running() {
            return None;
        }
        self.sync_elapsed(now_ms);
        self.status = ClockStatus::Stopped;
        self.start_time_ms = None;
        let minutes = captured_minutes_from_ms(self.elapsed_ms);
        self.captured_minutes = Some(minutes);
        Some(minutes)
    }

    /// Back to idle. Returns `true` when the clock was running.
    pub fn reset(&mut self) -> bool {
        let was_running = self.is_running();
        self.status = ClockStatus::Idle;
        self.elapsed_ms = 0;
        self.start_time_ms = None;
        self.captured_minutes = None;
        was_running
    }

    /// Switches phase, passing through the stopped state if running, and
    /// leaves the clock idle. Returns `true` when the clock was running.
    pub fn set_phase(&mut self, phase: Phase, now_ms: i64) -> bool {
        let was_running = self.stop(now_ms).is_some();
        self.reset();
        self.phase = phase;
        was_running
    }

    pub fn set_phase_duration(&mut self, phase: Phase, minutes: u32) {
        self.phase_durations.set(phase, minutes);
    }

    pub fn take_captured_minutes(&mut self) -> Option<f64> {
        self.captured_minutes.take()
    }

    pub fn target_ms(&self) -> u64 {
        self.phase_durations.target_ms(self.phase)
    }

    pub fn remaining_ms(&self) -> u64 {
        self.target_ms().saturating_sub(self.elapsed_ms)
    }

    pub fn overtime_ms(&self) -> u64 {
        self.elapsed_ms.saturating_sub(self.target_ms())
    }

    pub fn is_overtime(&self) -> bool {
        self.elapsed_ms > self.target_ms()
    }

    pub fn progress_percent(&self) -> f64 {
        let target = self.target_ms();
        if target == 0 {
            return if self.elapsed_ms > 0 { 100.0 } else { 0.0 };
        }
        (self.elapsed_ms as f64 / target as f64 * 100.0).min(100.0)
    }
}
