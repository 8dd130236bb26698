use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Result, anyhow};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use super::executor::ExecutorSet;
use super::scheduler::LiveSet;
use super::throttle::NotificationThrottle;
use super::transition::{self, Transition};
use super::types::{CheckOutcome, RawState, classify};
use crate::notify::Notifier;
use crate::store::models::{LogEntry, Monitor, MonitorStatus};
use crate::store::{CredentialResolver, LogRepository, MonitorRepository, NotificationMethodSource};

/// Everything a check loop needs to run one monitor.
pub struct CheckContext {
    pub monitors: Arc<dyn MonitorRepository>,
    pub logs: Arc<dyn LogRepository>,
    pub credentials: Arc<dyn CredentialResolver>,
    pub methods: Arc<dyn NotificationMethodSource>,
    pub notifier: Arc<dyn Notifier>,
    pub executors: Arc<dyn ExecutorSet>,
    pub throttle: Arc<NotificationThrottle>,
}

/// Per-monitor check loop.
///
/// Ticks at the monitor's own interval (first tick immediately), re-verifying
/// before every cycle that the monitor still exists in storage. That
/// existence check is what stops the loop for a deleted monitor without
/// waiting for a full reconciliation pass; termination may lag deletion by up
/// to one interval.
pub(crate) async fn run_monitor(ctx: Arc<CheckContext>, live: LiveSet, mut monitor: Monitor) {
    info!(
        "Starting check loop for {} (interval {}s)",
        monitor.name, monitor.check_interval
    );
    let mut ticker =
        tokio::time::interval(Duration::from_secs(monitor.check_interval.max(1)));
    // A probe slower than the interval must not be followed by back-to-back
    // catch-up cycles.
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match ctx.monitors.get(monitor.id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!("Monitor {} no longer exists, stopping its check loop", monitor.name);
                live.remove(monitor.id).await;
                ctx.throttle.forget(monitor.id);
                return;
            }
            Err(err) => {
                // A storage hiccup is not a deletion; keep the loop alive.
                warn!("Existence check failed for {}: {err:#}", monitor.name);
                continue;
            }
        }

        check_cycle(&ctx, &mut monitor).await;
    }
}

/// One complete check cycle: probe, state transition, persistence, log
/// append, notification decision. Persistence and notification failures are
/// logged and never abort the cycle.
pub(crate) async fn check_cycle(ctx: &CheckContext, monitor: &mut Monitor) {
    // A panic inside a probe must not take the runner down; it is accounted
    // as a failed check like any other.
    let probed = AssertUnwindSafe(probe(ctx, monitor)).catch_unwind().await;
    let probed = match probed {
        Ok(result) => result,
        Err(_) => Err(anyhow!("check aborted unexpectedly")),
    };

    let (raw, outcome) = match probed {
        Ok(outcome) => (classify(outcome.code), outcome),
        Err(err) => (
            RawState::Down,
            CheckOutcome { code: 0, message: format!("{err:#}"), response_time_ms: 0 },
        ),
    };

    let transition =
        transition::apply(monitor, raw, outcome.code, outcome.response_time_ms, SystemTime::now());
    debug!(
        "Monitor {}: {} -> {} (failures {}/{})",
        monitor.name,
        transition.previous,
        transition.current,
        monitor.failure_count,
        monitor.failure_threshold
    );

    if let Err(err) = ctx.monitors.update(monitor).await {
        error!("Failed to persist monitor {}: {err:#}", monitor.name);
    }

    let entry = LogEntry::new(monitor.id, monitor.status, outcome.message.clone());
    if let Err(err) = ctx.logs.append(&entry).await {
        error!("Failed to append check log for {}: {err:#}", monitor.name);
    }

    maybe_notify(ctx, monitor, transition, &outcome.message).await;
}

/// Resolve the credential (when configured) and run the selected execution
/// strategy. A credential that cannot be resolved fails the check before any
/// probe is issued.
async fn probe(ctx: &CheckContext, monitor: &Monitor) -> Result<CheckOutcome> {
    let auth = match monitor.credential_id {
        Some(credential_id) => Some(
            ctx.credentials
                .resolve(credential_id)
                .await
                .map_err(|err| anyhow!("credential error: {err:#}"))?,
        ),
        None => None,
    };

    ctx.executors.for_monitor(monitor).execute(monitor, auth.as_ref()).await
}

async fn maybe_notify(ctx: &CheckContext, monitor: &Monitor, transition: Transition, message: &str) {
    let should_notify = if transition.changed() {
        true
    } else if monitor.status == MonitorStatus::Down {
        ctx.throttle.should_notify(monitor.id, monitor.failure_count)
    } else {
        false
    };
    if !should_notify {
        return;
    }

    let methods = match ctx.methods.list_for_profile(monitor.profile_id).await {
        Ok(methods) => methods,
        Err(err) => {
            error!("Failed to load notification methods for {}: {err:#}", monitor.name);
            return;
        }
    };
    if methods.is_empty() {
        return;
    }

    info!(
        "Notifying: {} changed {} -> {}",
        monitor.name, transition.previous, transition.current
    );
    if let Err(err) = ctx.notifier.send(monitor, monitor.status, message, &methods).await {
        // Delivery failures never roll back the transition or the log entry.
        error!("Notification delivery failed for {}: {err:#}", monitor.name);
    }
}
