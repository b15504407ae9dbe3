/// Whole minutes, seconds and hundredths of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeParts {
    pub minutes: u64,
    pub seconds: u64,
    pub centis: u64,
}

impl TimeParts {
    pub fn from_ms(ms: u64) -> Self {
        let total_seconds = ms / 1_000;
        Self {
            minutes: total_seconds / 60,
            seconds: total_seconds % 60,
            centis: (ms % 1_000) / 10,
        }
    }
}

/// `MM:SS`
pub fn format_compact(ms: u64) -> String {
    let parts = TimeParts::from_ms(ms);
    format!("{:02}:{:02}", parts.minutes, parts.seconds)
}

/// `MM:SS.cc`
pub fn format_precise(ms: u64) -> String {
    let parts = TimeParts::from_ms(ms);
    format!("{:02}:{:02}.{:02}", parts.minutes, parts.seconds, parts.centis)
}

/// Countdown display: `-MM:SS` left, or `+MM:SS` past the target.
pub fn format_countdown(remaining_ms: u64, overtime_ms: u64) -> String {
    if overtime_ms > 0 {
        format!("+{}", format_compact(overtime_ms))
    } else {
        format!("-{}", format_compact(remaining_ms))
    }
}
