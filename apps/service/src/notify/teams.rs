use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use super::status_info;
use crate::store::models::{Monitor, MonitorStatus, NotificationMethod};

#[derive(Debug, Clone, Deserialize)]
pub struct TeamsConfig {
    pub webhook_url: String,
}

/// Adaptive Card payload, wrapped the way Teams incoming webhooks expect.
pub(super) fn build_payload(monitor: &Monitor, status: MonitorStatus, message: &str) -> Value {
    let info = status_info(status);
    json!({
        "type": "message",
        "attachments": [
            {
                "contentType": "application/vnd.microsoft.card.adaptive",
                "content": {
                    "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                    "type": "AdaptiveCard",
                    "version": "1.4",
                    "body": [
                        {
                            "type": "TextBlock",
                            "size": "Large",
                            "weight": "Bolder",
                            "text": format!("{} Monitor {} is {}", info.symbol, monitor.name, info.display),
                        },
                        {
                            "type": "FactSet",
                            "facts": [
                                { "title": "Status", "value": info.display },
                                { "title": "Target", "value": monitor.url },
                                { "title": "Details", "value": message },
                                { "title": "Time", "value": Utc::now().to_rfc2822() },
                            ]
                        }
                    ]
                }
            }
        ]
    })
}

pub(super) async fn send(
    client: &reqwest::Client,
    monitor: &Monitor,
    status: MonitorStatus,
    message: &str,
    method: &NotificationMethod,
) -> Result<()> {
    let config: TeamsConfig = method.parse_config().context("invalid Teams configuration")?;
    let payload = build_payload(monitor, status, message);

    let response = client
        .post(&config.webhook_url)
        .json(&payload)
        .send()
        .await
        .context("Teams webhook request failed")?;

    if !response.status().is_success() {
        let code = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Teams webhook returned {code}: {body}"));
    }
    Ok(())
}
