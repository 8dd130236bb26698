use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::runner::{CheckContext, run_monitor};
use crate::store::models::Monitor;

/// Check intervals below this floor are reset to the default.
const MIN_CHECK_INTERVAL_SECS: u64 = 10;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// How often the live set is reconciled against persisted state.
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// The authoritative in-memory set of actively polled monitors, keyed by
/// monitor ID. Values are the supervised runner task handles so removal can
/// also stop a runner that is mid-flight.
#[derive(Clone, Default)]
pub struct LiveSet {
    inner: Arc<RwLock<HashMap<Uuid, JoinHandle<()>>>>,
}

impl LiveSet {
    pub async fn ids(&self) -> Vec<Uuid> {
        self.inner.read().await.keys().copied().collect()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.inner.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Register a runner task. When the ID is already live the map is left
    /// untouched and the rejected handle is handed back so the caller can
    /// abort it; the duplicate guard for concurrent reconciliations.
    pub(crate) async fn insert(&self, id: Uuid, handle: JoinHandle<()>) -> Option<JoinHandle<()>> {
        let mut map = self.inner.write().await;
        if map.contains_key(&id) {
            return Some(handle);
        }
        map.insert(id, handle);
        None
    }

    pub(crate) async fn remove(&self, id: Uuid) -> Option<JoinHandle<()>> {
        self.inner.write().await.remove(&id)
    }

    async fn drain(&self) -> Vec<JoinHandle<()>> {
        self.inner.write().await.drain().map(|(_, handle)| handle).collect()
    }
}

/// Owns the live monitor set and keeps it approximately consistent with
/// persisted state: an initial reconciliation on start, then a fixed-cadence
/// background reconciliation loop. Each active monitor gets an independent
/// check loop; a slow check on one monitor never delays another.
pub struct Scheduler {
    ctx: Arc<CheckContext>,
    live: LiveSet,
    reconcile_interval: Duration,
    reconcile_task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(ctx: CheckContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            live: LiveSet::default(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            reconcile_task: Mutex::new(None),
        }
    }

    /// Override the reconciliation cadence (used by tests).
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    /// A snapshot of the IDs currently being polled.
    pub async fn live_ids(&self) -> Vec<Uuid> {
        self.live.ids().await
    }

    /// Run the initial reconciliation and launch the background loop. Never
    /// blocks the caller past the initial load; a failed initial load is
    /// logged and retried on the next cycle.
    pub async fn start(&self) {
        info!("Scheduler starting");
        if let Err(err) = reconcile_once(&self.ctx, &self.live).await {
            error!("Initial monitor load failed: {err:#}");
        }

        let ctx = self.ctx.clone();
        let live = self.live.clone();
        let interval = self.reconcile_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick duplicates the initial reconciliation.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!("Periodic reconciliation of monitors");
                if let Err(err) = reconcile_once(&ctx, &live).await {
                    error!("Reconciliation failed: {err:#}");
                }
            }
        });

        let mut slot = self.reconcile_task.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(handle);
    }

    /// Force one reconciliation pass.
    pub async fn reconcile(&self) -> Result<()> {
        reconcile_once(&self.ctx, &self.live).await
    }

    /// Stop the reconciliation loop and all runner tasks.
    pub async fn stop(&self) {
        let handle = {
            let mut slot = self.reconcile_task.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(handle) = handle {
            handle.abort();
        }

        let handles = self.live.drain().await;
        let count = handles.len();
        for handle in handles {
            handle.abort();
        }
        info!("Scheduler stopped ({count} check loops)");
    }
}

/// Diff persisted monitors against the live set.
///
/// Monitors in storage but not live are validated and started (if active);
/// live monitors that are gone from storage or deactivated are removed and
/// their runner aborted. Monitors present on both sides are left alone: the
/// in-memory copy, including accumulated failure counts, stays authoritative
/// between reconciliations.
async fn reconcile_once(ctx: &Arc<CheckContext>, live: &LiveSet) -> Result<()> {
    let stored = ctx.monitors.list_for_active_profile().await?;
    debug!("Loaded {} monitors from storage", stored.len());

    let keep: HashSet<Uuid> = stored.iter().filter(|m| m.is_active).map(|m| m.id).collect();

    let mut removed = 0usize;
    for id in live.ids().await {
        if !keep.contains(&id) {
            if let Some(handle) = live.remove(id).await {
                handle.abort();
                ctx.throttle.forget(id);
                removed += 1;
                info!("Removed monitor {id} from the live set");
            }
        }
    }

    let mut added = 0usize;
    for mut monitor in stored {
        if !monitor.is_active || live.contains(monitor.id).await {
            continue;
        }

        validate(&mut monitor);

        let handle = tokio::spawn(run_monitor(ctx.clone(), live.clone(), monitor.clone()));
        match live.insert(monitor.id, handle).await {
            None => {
                added += 1;
                info!("Added monitor {} ({}) to the live set", monitor.name, monitor.id);
            }
            Some(rejected) => {
                // Lost the race against a concurrent reconciliation; this
                // copy must not run alongside the winner.
                warn!("Duplicate check loop for {} suppressed", monitor.name);
                rejected.abort();
            }
        }
    }

    if added > 0 || removed > 0 {
        info!("Reconciliation done: added {added}, removed {removed}, live {}", live.len().await);
    }
    Ok(())
}

/// Sanity-check a monitor before it joins the live set.
fn validate(monitor: &mut Monitor) {
    if monitor.check_interval < MIN_CHECK_INTERVAL_SECS {
        warn!(
            "Monitor {} has a very low check interval ({}s); resetting to {}s",
            monitor.name, monitor.check_interval, DEFAULT_CHECK_INTERVAL_SECS
        );
        monitor.check_interval = DEFAULT_CHECK_INTERVAL_SECS;
    }
    if monitor.failure_threshold == 0 {
        monitor.failure_threshold = 1;
    }
}
