use anyhow::{Context, Result};
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use super::status_info;
use crate::store::models::{Monitor, MonitorStatus, NotificationMethod};

/// SMTP settings carried in the notification method's config payload.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_email: String,
    pub smtp_password: String,
    pub recipient_email: String,
}

fn default_smtp_port() -> u16 {
    587
}

pub(super) async fn send(
    monitor: &Monitor,
    status: MonitorStatus,
    message: &str,
    method: &NotificationMethod,
) -> Result<()> {
    let config: EmailConfig = method.parse_config().context("invalid email configuration")?;

    let info = status_info(status);
    let subject = format!("{} Monitor {} is {}", info.symbol, monitor.name, info.display);
    let body = format!(
        "Monitor: {}\nStatus: {}\nTarget: {}\nDetails: {}\nTime: {}\n",
        monitor.name,
        info.display,
        monitor.url,
        message,
        Utc::now().to_rfc2822()
    );

    let email = Message::builder()
        .from(config.smtp_email.parse().context("invalid sender address")?)
        .to(config.recipient_email.parse().context("invalid recipient address")?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body)?;

    let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        .context("invalid SMTP host")?
        .port(config.smtp_port)
        .credentials(Credentials::new(config.smtp_email, config.smtp_password))
        .build();

    transport.send(email).await.context("SMTP send failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_defaults_the_port() {
        let config: EmailConfig = serde_json::from_value(json!({
            "smtp_host": "smtp.example.com",
            "smtp_email": "alerts@example.com",
            "smtp_password": "secret",
            "recipient_email": "ops@example.com",
        }))
        .unwrap();
        assert_eq!(config.smtp_port, 587);
    }

    #[test]
    fn config_rejects_missing_host() {
        let result: Result<EmailConfig, _> = serde_json::from_value(json!({
            "smtp_email": "alerts@example.com",
            "smtp_password": "secret",
            "recipient_email": "ops@example.com",
        }));
        assert!(result.is_err());
    }
}
