use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a monitor, advanced only by the check state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    #[default]
    Pending,
    Up,
    Down,
    Unauthorized,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Pending => "pending",
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Unauthorized => "unauthorized",
        }
    }

    /// Parse a stored status string. Anything unknown (including the empty
    /// string written by older clients) defaults to `pending`.
    pub fn parse(value: &str) -> Self {
        match value {
            "up" => MonitorStatus::Up,
            "down" => MonitorStatus::Down,
            "unauthorized" => MonitorStatus::Unauthorized,
            _ => MonitorStatus::Pending,
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of target a monitor points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    Http,
    Mysql,
    Postgres,
    Mongodb,
    Redis,
}

impl MonitorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::Http => "http",
            MonitorKind::Mysql => "mysql",
            MonitorKind::Postgres => "postgres",
            MonitorKind::Mongodb => "mongodb",
            MonitorKind::Redis => "redis",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "mysql" => MonitorKind::Mysql,
            "postgres" => MonitorKind::Postgres,
            "mongodb" => MonitorKind::Mongodb,
            "redis" => MonitorKind::Redis,
            _ => MonitorKind::Http,
        }
    }

    /// Database-backed monitors are probed with a TCP connect rather than an
    /// HTTP request.
    pub fn is_database(&self) -> bool {
        !matches!(self, MonitorKind::Http)
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an HTTP check is performed: through the in-process client or by
/// shelling out to `curl`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    #[default]
    Http,
    Curl,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Http => "http",
            RequestType::Curl => "curl",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "curl" => RequestType::Curl,
            _ => RequestType::Http,
        }
    }
}

/// A configured endpoint under periodic health observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub name: String,
    pub kind: MonitorKind,
    pub url: String,
    pub method: String,
    pub request_type: RequestType,
    /// JSON object mapping header names to values, as entered by the user.
    pub headers: Option<String>,
    pub body: Option<String>,
    /// Weak reference to a credential; resolved through the store, never owned.
    pub credential_id: Option<Uuid>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    /// Seconds between checks. Values below the floor are reset on load.
    pub check_interval: u64,
    /// Per-check timeout in seconds.
    pub timeout: u64,
    pub failure_threshold: u32,
    pub failure_count: u32,
    pub is_active: bool,
    pub status: MonitorStatus,
    /// Last observed HTTP status code; 0 when the check never produced one.
    pub response_code: u16,
    /// Last observed response time in milliseconds.
    pub response_time: u64,
    pub last_checked: Option<SystemTime>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Monitor {
    pub fn new(name: impl Into<String>, kind: MonitorKind, url: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            profile_id: Uuid::nil(),
            name: name.into(),
            kind,
            url: url.into(),
            method: "GET".to_string(),
            request_type: RequestType::Http,
            headers: None,
            body: None,
            credential_id: None,
            db_host: None,
            db_port: None,
            check_interval: 60,
            timeout: 10,
            failure_threshold: 3,
            failure_count: 0,
            is_active: true,
            status: MonitorStatus::Pending,
            response_code: 0,
            response_time: 0,
            last_checked: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Parse the stored headers JSON into a map. A malformed value is logged
    /// and treated as no headers rather than failing the check.
    pub fn headers_map(&self) -> Option<HashMap<String, String>> {
        let raw = self.headers.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        match serde_json::from_str(raw) {
            Ok(map) => Some(map),
            Err(err) => {
                tracing::warn!("Monitor {}: ignoring malformed headers: {err}", self.name);
                None
            }
        }
    }
}

/// Convert a timestamp to Unix seconds for storage.
pub(crate) fn unix_seconds(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Convert stored Unix seconds back to a timestamp.
pub(crate) fn from_unix_seconds(seconds: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(seconds.max(0) as u64)
}

/// One completed check, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub monitor_id: Uuid,
    pub status: MonitorStatus,
    pub message: String,
    pub created_at: SystemTime,
}

impl LogEntry {
    pub fn new(monitor_id: Uuid, status: MonitorStatus, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            monitor_id,
            status,
            message: message.into(),
            created_at: SystemTime::now(),
        }
    }
}

/// Scoping entity: repository queries are restricted to the active profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Basic,
    Bearer,
    Oauth2,
    ApiKey,
    Custom,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Basic => "basic",
            CredentialKind::Bearer => "bearer",
            CredentialKind::Oauth2 => "oauth2",
            CredentialKind::ApiKey => "api_key",
            CredentialKind::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "basic" => CredentialKind::Basic,
            "bearer" => CredentialKind::Bearer,
            "oauth2" => CredentialKind::Oauth2,
            "api_key" => CredentialKind::ApiKey,
            _ => CredentialKind::Custom,
        }
    }
}

/// A stored credential used to authenticate outbound checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub name: String,
    pub kind: CredentialKind,
    pub token: String,
    pub username: String,
    pub password: String,
    pub header_name: String,
    pub header_value: String,
}

/// The header a resolved credential contributes to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeader {
    pub name: String,
    pub value: String,
}

impl Credential {
    /// Render the auth header for this credential.
    ///
    /// Bearer-style tokens are normalized so a token that already carries the
    /// `Bearer ` prefix is not prefixed twice.
    pub fn rendered_header(&self) -> AuthHeader {
        let value = match self.kind {
            CredentialKind::Basic => {
                if self.token.is_empty() {
                    let pair = format!("{}:{}", self.username, self.password);
                    format!("Basic {}", BASE64.encode(pair))
                } else {
                    format!("Basic {}", self.token)
                }
            }
            CredentialKind::Bearer | CredentialKind::Oauth2 => {
                if self.token.starts_with("Bearer ") {
                    self.token.clone()
                } else {
                    format!("Bearer {}", self.token)
                }
            }
            CredentialKind::ApiKey => self.token.clone(),
            CredentialKind::Custom => self.header_value.clone(),
        };

        let name = if self.header_name.is_empty() {
            "Authorization".to_string()
        } else {
            self.header_name.clone()
        };

        AuthHeader { name, value }
    }
}

/// Which channel a notification method targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Slack,
    Teams,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Slack => "slack",
            ChannelKind::Teams => "teams",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(ChannelKind::Email),
            "slack" => Some(ChannelKind::Slack),
            "teams" => Some(ChannelKind::Teams),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured notification channel. Read-only from the core's perspective;
/// the config payload shape depends on the channel kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMethod {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub kind: ChannelKind,
    pub enabled: bool,
    pub config: serde_json::Value,
}

impl NotificationMethod {
    /// Deserialize the opaque config payload into a channel-specific shape.
    pub fn parse_config<T: serde::de::DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(serde_json::from_value(self.config.clone())?)
    }
}
