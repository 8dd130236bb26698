//! Outbound status-change notifications.
//!
//! The check loop hands a monitor, its new status, and the configured channel
//! methods to the [`Notifier`]; the dispatcher fans the message out to each
//! channel. Delivery is best-effort: per-channel failures are collected and
//! reported, never retried here.

mod email;
mod slack;
mod teams;

use std::collections::HashSet;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{error, info};

use crate::store::models::{ChannelKind, Monitor, MonitorStatus, NotificationMethod};

pub use email::EmailConfig;
pub use slack::SlackConfig;
pub use teams::TeamsConfig;

/// Presentation attributes for a status, shared by every channel.
pub(crate) struct StatusInfo {
    pub symbol: &'static str,
    pub color: &'static str,
    pub display: &'static str,
}

pub(crate) fn status_info(status: MonitorStatus) -> StatusInfo {
    match status {
        MonitorStatus::Up => StatusInfo { symbol: "✅", color: "good", display: "UP" },
        MonitorStatus::Down => StatusInfo { symbol: "❌", color: "danger", display: "DOWN" },
        MonitorStatus::Unauthorized => {
            StatusInfo { symbol: "⚠️", color: "warning", display: "UNAUTHORIZED" }
        }
        MonitorStatus::Pending => StatusInfo { symbol: "⏳", color: "default", display: "PENDING" },
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        monitor: &Monitor,
        status: MonitorStatus,
        message: &str,
        methods: &[NotificationMethod],
    ) -> Result<()>;
}

/// Fans one status change out to every configured channel kind.
pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Select the methods to deliver to: enabled only, and at most one method per
/// channel kind (the first configured one wins).
fn plan(methods: &[NotificationMethod]) -> Vec<&NotificationMethod> {
    let mut seen = HashSet::new();
    methods
        .iter()
        .filter(|method| method.enabled && seen.insert(method.kind))
        .collect()
}

#[async_trait]
impl Notifier for Dispatcher {
    async fn send(
        &self,
        monitor: &Monitor,
        status: MonitorStatus,
        message: &str,
        methods: &[NotificationMethod],
    ) -> Result<()> {
        let mut failures = Vec::new();

        for method in plan(methods) {
            let delivery = match method.kind {
                ChannelKind::Email => email::send(monitor, status, message, method).await,
                ChannelKind::Slack => {
                    slack::send(&self.client, monitor, status, message, method).await
                }
                ChannelKind::Teams => {
                    teams::send(&self.client, monitor, status, message, method).await
                }
            };

            match delivery {
                Ok(()) => info!("Sent {} notification for {}", method.kind, monitor.name),
                Err(err) => {
                    error!("{} notification failed for {}: {err:#}", method.kind, monitor.name);
                    failures.push(format!("{}: {err:#}", method.kind));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("notification delivery failed: {}", failures.join("; ")))
        }
    }
}
