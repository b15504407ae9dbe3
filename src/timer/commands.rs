//! Command handlers: one per clock operation, each taking the application
//! state and returning a serializable result or an error string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppState;

use super::{
    format::{format_countdown, format_precise},
    ClockController, ClockSnapshot, Phase,
};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ClockView {
    #[serde(flatten)]
    pub snapshot: ClockSnapshot,
    pub elapsed_display: String,
    pub countdown_display: String,
}

impl From<ClockSnapshot> for ClockView {
    fn from(snapshot: ClockSnapshot) -> Self {
        Self {
            elapsed_display: format_precise(snapshot.state.elapsed_ms),
            countdown_display: format_countdown(snapshot.remaining_ms, snapshot.overtime_ms),
            snapshot,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SetPhaseArgs {
    phase: Phase,
}

#[derive(Debug, Deserialize)]
struct SetPhaseDurationArgs {
    phase: Phase,
    minutes: u32,
}

fn controller_from_state(state: &AppState) -> ClockController {
    state.timer.clone()
}

pub async fn get_timer_state(state: &AppState) -> Result<ClockView, String> {
    let controller = controller_from_state(state);
    Ok(controller.snapshot().await.into())
}

pub async fn start_timer(state: &AppState) -> Result<ClockView, String> {
    let controller = controller_from_state(state);
    Ok(controller.start().await.into())
}

pub async fn stop_timer(state: &AppState) -> Result<ClockView, String> {
    let controller = controller_from_state(state);
    Ok(controller.stop().await.into())
}

pub async fn reset_timer(state: &AppState) -> Result<ClockView, String> {
    let controller = controller_from_state(state);
    Ok(controller.reset().await.into())
}

pub async fn set_phase(state: &AppState, phase: Phase) -> Result<ClockView, String> {
    let controller = controller_from_state(state);
    Ok(controller.set_phase(phase).await.into())
}

pub async fn set_phase_duration(
    state: &AppState,
    phase: Phase,
    minutes: u32,
) -> Result<ClockView, String> {
    let controller = controller_from_state(state);
    Ok(controller.set_phase_duration(phase, minutes).await.into())
}

pub async fn take_captured_minutes(state: &AppState) -> Result<Option<f64>, String> {
    let controller = controller_from_state(state);
    Ok(controller.take_captured_minutes().await)
}

fn parse_args<T: for<'de> Deserialize<'de>>(command: &str, args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("invalid arguments for {command}: {e}"))
}

fn to_value<T: Serialize>(result: Result<T, String>) -> Result<Value, String> {
    result.and_then(|value| serde_json::to_value(value).map_err(|e| e.to_string()))
}

/// Routes a command name and its JSON arguments to the matching handler.
pub async fn invoke(state: &AppState, command: &str, args: Value) -> Result<Value, String> {
    match command {
        "get_timer_state" => to_value(get_timer_state(state).await),
        "start_timer" => to_value(start_timer(state).await),
        "stop_timer" => to_value(stop_timer(state).await),
        "reset_timer" => to_value(reset_timer(state).await),
        "set_phase" => {
            let SetPhaseArgs { phase } = parse_args(command, args)?;
            to_value(set_phase(state, phase).await)
        }
        "set_phase_duration" => {
            let SetPhaseDurationArgs { phase, minutes } = parse_args(command, args)?;
            to_value(set_phase_duration(state, phase, minutes).await)
        }
        "take_captured_minutes" => to_value(take_captured_minutes(state).await),
        other => {
            log_warn!("Rejected unknown command '{other}'");
            Err(format!("unknown command '{other}'"))
        }
    }
}
