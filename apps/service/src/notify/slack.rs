use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use super::status_info;
use crate::store::models::{Monitor, MonitorStatus, NotificationMethod};

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub channel: Option<String>,
}

/// Block Kit payload for one status change.
pub(super) fn build_payload(monitor: &Monitor, status: MonitorStatus, message: &str, channel: Option<&str>) -> Value {
    let info = status_info(status);
    let mut payload = json!({
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("{} Monitor {} is {}", info.symbol, monitor.name, info.display),
                    "emoji": true,
                }
            },
            {
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Status:*\n{}", info.display) },
                    { "type": "mrkdwn", "text": format!("*Target:*\n{}", monitor.url) },
                ]
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("*Details:* {message}") }
            },
            {
                "type": "context",
                "elements": [
                    { "type": "mrkdwn", "text": format!("Observed at {}", Utc::now().to_rfc2822()) }
                ]
            }
        ]
    });

    if let Some(channel) = channel {
        payload["channel"] = json!(channel);
    }
    payload
}

pub(super) async fn send(
    client: &reqwest::Client,
    monitor: &Monitor,
    status: MonitorStatus,
    message: &str,
    method: &NotificationMethod,
) -> Result<()> {
    let config: SlackConfig = method.parse_config().context("invalid Slack configuration")?;
    let payload = build_payload(monitor, status, message, config.channel.as_deref());

    let response = client
        .post(&config.webhook_url)
        .json(&payload)
        .send()
        .await
        .context("Slack webhook request failed")?;

    if !response.status().is_success() {
        let code = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Slack webhook returned {code}: {body}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::MonitorKind;

    #[test]
    fn payload_carries_status_and_target() {
        let monitor = Monitor::new("api", MonitorKind::Http, "https://example.com/health");
        let payload =
            build_payload(&monitor, MonitorStatus::Down, "connection refused", Some("#alerts"));

        assert_eq!(payload["channel"], "#alerts");
        let header = payload["blocks"][0]["text"]["text"].as_str().unwrap();
        assert!(header.contains("api"));
        assert!(header.contains("DOWN"));
        let fields = payload["blocks"][1]["fields"].as_array().unwrap();
        assert!(fields[1]["text"].as_str().unwrap().contains("https://example.com/health"));
    }

    #[test]
    fn channel_is_omitted_when_unset() {
        let monitor = Monitor::new("api", MonitorKind::Http, "https://example.com");
        let payload = build_payload(&monitor, MonitorStatus::Up, "ok", None);
        assert!(payload.get("channel").is_none());
    }
}
