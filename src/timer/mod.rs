pub mod clock;
pub mod commands;
pub mod controller;
pub mod format;
pub mod persist;
pub mod state;

pub use clock::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use controller::{ClockController, ClockSnapshot, DEFAULT_REFRESH_INTERVAL};
pub use state::{ClockState, ClockStatus, Phase, PhaseDurations};
