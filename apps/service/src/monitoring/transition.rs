use std::time::{Duration, SystemTime};

use super::types::RawState;
use crate::store::models::{Monitor, MonitorStatus};

/// Multiplier for the starvation guard: a monitor that stays `pending` for
/// longer than this many check intervals is forced down.
const PENDING_GRACE_INTERVALS: u32 = 3;

/// The status edge produced by one check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: MonitorStatus,
    pub current: MonitorStatus,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Advance a monitor's state machine with one raw probe result.
///
/// Failures accumulate against the threshold before the status flips to
/// `down`; a monitor that was `pending` stays pending through initial
/// failures, and one that was `up` holds its old status until the threshold
/// is reached. A raw `unauthorized` that crosses the threshold collapses to
/// `down`, matching the long-standing behavior of the production system.
pub fn apply(
    monitor: &mut Monitor,
    raw: RawState,
    code: u16,
    response_time_ms: u64,
    now: SystemTime,
) -> Transition {
    let previous = monitor.status;

    let mut current = if raw.is_failure() {
        monitor.failure_count += 1;
        if monitor.failure_count >= monitor.failure_threshold.max(1) {
            MonitorStatus::Down
        } else if previous == MonitorStatus::Pending {
            MonitorStatus::Pending
        } else {
            previous
        }
    } else {
        monitor.failure_count = 0;
        MonitorStatus::Up
    };

    // Starvation guard: a monitor must not sit in pending forever (for
    // example a credential-error loop that never crosses the threshold).
    if previous == MonitorStatus::Pending {
        if let Some(last_checked) = monitor.last_checked {
            let grace =
                Duration::from_secs(monitor.check_interval * u64::from(PENDING_GRACE_INTERVALS));
            if now.duration_since(last_checked).unwrap_or_default() > grace {
                current = MonitorStatus::Down;
            }
        }
    }

    monitor.status = current;
    monitor.response_code = code;
    monitor.response_time = response_time_ms;
    monitor.last_checked = Some(now);

    Transition { previous, current }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::MonitorKind;

    fn monitor_with_threshold(threshold: u32) -> Monitor {
        let mut monitor = Monitor::new("svc", MonitorKind::Http, "https://example.com");
        monitor.failure_threshold = threshold;
        monitor
    }

    #[test]
    fn repeated_up_cycles_are_idempotent() {
        let mut monitor = monitor_with_threshold(3);
        for _ in 0..25 {
            let t = apply(&mut monitor, RawState::Up, 200, 12, SystemTime::now());
            assert_eq!(t.current, MonitorStatus::Up);
            assert_eq!(monitor.failure_count, 0);
        }
    }

    #[test]
    fn pending_monitor_stays_pending_until_threshold() {
        let mut monitor = monitor_with_threshold(3);
        let now = SystemTime::now();

        let t1 = apply(&mut monitor, RawState::Down, 503, 0, now);
        assert_eq!(t1.current, MonitorStatus::Pending);
        let t2 = apply(&mut monitor, RawState::Down, 503, 0, now);
        assert_eq!(t2.current, MonitorStatus::Pending);
        let t3 = apply(&mut monitor, RawState::Down, 503, 0, now);
        assert_eq!(t3.current, MonitorStatus::Down);
        assert_eq!(monitor.failure_count, 3);
    }

    #[test]
    fn up_monitor_holds_status_below_threshold() {
        let mut monitor = monitor_with_threshold(3);
        let now = SystemTime::now();
        apply(&mut monitor, RawState::Up, 200, 5, now);

        let t1 = apply(&mut monitor, RawState::Down, 500, 0, now);
        assert_eq!(t1.current, MonitorStatus::Up);
        let t2 = apply(&mut monitor, RawState::Down, 500, 0, now);
        assert_eq!(t2.current, MonitorStatus::Up);
        let t3 = apply(&mut monitor, RawState::Down, 500, 0, now);
        assert_eq!(t3.current, MonitorStatus::Down);
        assert!(t3.changed());
    }

    #[test]
    fn unauthorized_collapses_to_down_at_threshold() {
        let mut monitor = monitor_with_threshold(2);
        let now = SystemTime::now();

        apply(&mut monitor, RawState::Unauthorized, 401, 0, now);
        let t = apply(&mut monitor, RawState::Unauthorized, 401, 0, now);
        assert_eq!(t.current, MonitorStatus::Down);
    }

    #[test]
    fn recovery_after_down_resets_failures_and_notifies_edge() {
        // The scenario from the operational runbook: threshold 3, starts
        // pending, three failures, then a success.
        let mut monitor = monitor_with_threshold(3);
        let now = SystemTime::now();

        let mut statuses = Vec::new();
        for _ in 0..3 {
            statuses.push(apply(&mut monitor, RawState::Down, 502, 0, now).current);
        }
        assert_eq!(
            statuses,
            vec![MonitorStatus::Pending, MonitorStatus::Pending, MonitorStatus::Down]
        );

        let recovery = apply(&mut monitor, RawState::Up, 200, 20, now);
        assert_eq!(recovery.previous, MonitorStatus::Down);
        assert_eq!(recovery.current, MonitorStatus::Up);
        assert!(recovery.changed());
        assert_eq!(monitor.failure_count, 0);
    }

    #[test]
    fn stale_pending_monitor_is_forced_down() {
        let mut monitor = monitor_with_threshold(10);
        monitor.check_interval = 10;
        let now = SystemTime::now();
        monitor.last_checked = Some(now - Duration::from_secs(31));

        // The guard overrides everything, even a successful probe with zero
        // recorded failures this cycle.
        let mut probe = monitor.clone();
        let t = apply(&mut probe, RawState::Up, 200, 5, now);
        assert_eq!(t.current, MonitorStatus::Down);
        assert_eq!(probe.failure_count, 0);

        let t = apply(&mut monitor, RawState::Down, 0, 0, now);
        assert_eq!(t.current, MonitorStatus::Down);
        assert_eq!(monitor.failure_count, 1);
    }

    #[test]
    fn first_cycle_without_history_is_not_starved() {
        let mut monitor = monitor_with_threshold(3);
        assert!(monitor.last_checked.is_none());
        let t = apply(&mut monitor, RawState::Down, 0, 0, SystemTime::now());
        assert_eq!(t.current, MonitorStatus::Pending);
    }
}
