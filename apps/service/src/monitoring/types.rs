/// Semantic reading of a single probe result, before failure-threshold
/// accounting is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawState {
    Up,
    Down,
    Unauthorized,
    Redirect,
}

impl RawState {
    /// Everything that is not an outright success counts against the failure
    /// threshold.
    pub fn is_failure(&self) -> bool {
        !matches!(self, RawState::Up)
    }
}

/// Classify an HTTP status code. Code 0 (no response obtained) is down.
pub fn classify(code: u16) -> RawState {
    match code {
        200..=299 => RawState::Up,
        401 => RawState::Unauthorized,
        300..=399 => RawState::Redirect,
        _ => RawState::Down,
    }
}

/// What one execution strategy produced for a completed probe.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub code: u16,
    pub message: String,
    pub response_time_ms: u64,
}
