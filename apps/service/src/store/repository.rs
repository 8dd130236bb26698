use std::time::SystemTime;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use libsql::params;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::{
    AuthHeader, ChannelKind, Credential, CredentialKind, LogEntry, Monitor, MonitorKind,
    MonitorStatus, NotificationMethod, Profile, RequestType, from_unix_seconds, unix_seconds,
};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Read/write access to persisted monitors, scoped to the active profile.
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    /// All monitors belonging to the active profile (active and inactive).
    async fn list_for_active_profile(&self) -> Result<Vec<Monitor>>;

    /// Fetch one monitor by ID, `None` when it no longer exists.
    async fn get(&self, id: Uuid) -> Result<Option<Monitor>>;

    async fn update(&self, monitor: &Monitor) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Append-only check history.
#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn append(&self, entry: &LogEntry) -> Result<()>;

    async fn list_for_monitor(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<LogEntry>>;
}

/// Resolves a credential reference into the header it contributes.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, credential_id: Uuid) -> Result<AuthHeader>;
}

/// Source of configured notification channels for a profile.
#[async_trait]
pub trait NotificationMethodSource: Send + Sync {
    /// Enabled notification methods for the given profile.
    async fn list_for_profile(&self, profile_id: Uuid) -> Result<Vec<NotificationMethod>>;
}

const MONITOR_COLUMNS: &str = "id, profile_id, name, kind, url, method, request_type, headers, \
                               body, credential_id, db_host, db_port, check_interval, timeout, \
                               failure_threshold, failure_count, is_active, status, \
                               response_code, response_time, last_checked, created_at, updated_at";

/// LibSQL-backed implementation of all repository traits.
pub struct Store {
    pool: LibsqlPool,
}

impl Store {
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    /// The single active profile, if any has been created yet.
    pub async fn active_profile(&self) -> Result<Option<Profile>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query("SELECT id, name, is_active FROM profiles WHERE is_active = 1 LIMIT 1", ())
            .await?;

        match rows.next().await? {
            Some(row) => {
                let id: String = row.get(0)?;
                Ok(Some(Profile {
                    id: Uuid::parse_str(&id)?,
                    name: row.get(1)?,
                    is_active: row.get::<i64>(2)? != 0,
                }))
            }
            None => Ok(None),
        }
    }

    /// Fetch the active profile, creating a default one when none exists.
    pub async fn ensure_active_profile(&self) -> Result<Profile> {
        if let Some(profile) = self.active_profile().await? {
            return Ok(profile);
        }

        let profile = Profile {
            id: Uuid::new_v4(),
            name: "Default Profile".to_string(),
            is_active: true,
        };
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO profiles (id, name, is_active, created_at) VALUES (?, ?, 1, ?)",
            params![profile.id.to_string(), profile.name.clone(), unix_seconds(SystemTime::now())],
        )
        .await?;
        Ok(profile)
    }

    /// Insert a new monitor under the active profile. The runtime state is
    /// forced to a clean slate: status `pending`, zero failures.
    pub async fn create_monitor(&self, monitor: &Monitor) -> Result<Monitor> {
        let profile = self.ensure_active_profile().await?;
        let mut monitor = monitor.clone();
        monitor.profile_id = profile.id;
        monitor.status = MonitorStatus::Pending;
        monitor.failure_count = 0;

        let conn = self.get_conn().await?;
        conn.execute(
            &format!("INSERT INTO monitors ({MONITOR_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                monitor.id.to_string(),
                monitor.profile_id.to_string(),
                monitor.name.clone(),
                monitor.kind.as_str(),
                monitor.url.clone(),
                monitor.method.clone(),
                monitor.request_type.as_str(),
                monitor.headers.clone(),
                monitor.body.clone(),
                monitor.credential_id.map(|id| id.to_string()),
                monitor.db_host.clone(),
                monitor.db_port.map(i64::from),
                monitor.check_interval as i64,
                monitor.timeout as i64,
                monitor.failure_threshold as i64,
                monitor.failure_count as i64,
                monitor.is_active as i64,
                monitor.status.as_str(),
                monitor.response_code as i64,
                monitor.response_time as i64,
                monitor.last_checked.map(unix_seconds),
                unix_seconds(monitor.created_at),
                unix_seconds(monitor.updated_at),
            ],
        )
        .await?;
        Ok(monitor)
    }

    pub async fn create_credential(&self, credential: &Credential) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO credentials (id, profile_id, name, kind, token, username, password, \
             header_name, header_value) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                credential.id.to_string(),
                credential.profile_id.to_string(),
                credential.name.clone(),
                credential.kind.as_str(),
                credential.token.clone(),
                credential.username.clone(),
                credential.password.clone(),
                credential.header_name.clone(),
                credential.header_value.clone(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn create_notification_method(&self, method: &NotificationMethod) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO notification_methods (id, profile_id, kind, enabled, config) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                method.id.to_string(),
                method.profile_id.to_string(),
                method.kind.as_str(),
                method.enabled as i64,
                serde_json::to_string(&method.config)?,
            ],
        )
        .await?;
        Ok(())
    }
}

fn monitor_from_row(row: &libsql::Row) -> Result<Monitor> {
    let id: String = row.get(0)?;
    let profile_id: String = row.get(1)?;
    let kind: String = row.get(3)?;
    let request_type: String = row.get(6)?;
    let credential_id: Option<String> = row.get(9)?;
    let status: String = row.get(17)?;

    Ok(Monitor {
        id: Uuid::parse_str(&id).context("invalid monitor id")?,
        profile_id: Uuid::parse_str(&profile_id).context("invalid profile id")?,
        name: row.get(2)?,
        kind: MonitorKind::parse(&kind),
        url: row.get(4)?,
        method: row.get(5)?,
        request_type: RequestType::parse(&request_type),
        headers: row.get(7)?,
        body: row.get(8)?,
        credential_id: credential_id.as_deref().map(Uuid::parse_str).transpose()?,
        db_host: row.get(10)?,
        db_port: row.get::<Option<i64>>(11)?.map(|p| p.clamp(0, u16::MAX as i64) as u16),
        check_interval: row.get::<i64>(12)?.max(0) as u64,
        timeout: row.get::<i64>(13)?.max(0) as u64,
        failure_threshold: row.get::<i64>(14)?.max(0) as u32,
        failure_count: row.get::<i64>(15)?.max(0) as u32,
        is_active: row.get::<i64>(16)? != 0,
        status: MonitorStatus::parse(&status),
        response_code: row.get::<i64>(18)?.clamp(0, u16::MAX as i64) as u16,
        response_time: row.get::<i64>(19)?.max(0) as u64,
        last_checked: row.get::<Option<i64>>(20)?.map(from_unix_seconds),
        created_at: from_unix_seconds(row.get(21)?),
        updated_at: from_unix_seconds(row.get(22)?),
    })
}

#[async_trait]
impl MonitorRepository for Store {
    async fn list_for_active_profile(&self) -> Result<Vec<Monitor>> {
        let Some(profile) = self.active_profile().await? else {
            debug!("No active profile; no monitors to load");
            return Ok(Vec::new());
        };

        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE profile_id = ?"),
                params![profile.id.to_string()],
            )
            .await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?"),
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(monitor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, monitor: &Monitor) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET name = ?, kind = ?, url = ?, method = ?, request_type = ?, \
             headers = ?, body = ?, credential_id = ?, db_host = ?, db_port = ?, \
             check_interval = ?, timeout = ?, failure_threshold = ?, failure_count = ?, \
             is_active = ?, status = ?, response_code = ?, response_time = ?, last_checked = ?, \
             updated_at = ? WHERE id = ?",
            params![
                monitor.name.clone(),
                monitor.kind.as_str(),
                monitor.url.clone(),
                monitor.method.clone(),
                monitor.request_type.as_str(),
                monitor.headers.clone(),
                monitor.body.clone(),
                monitor.credential_id.map(|id| id.to_string()),
                monitor.db_host.clone(),
                monitor.db_port.map(i64::from),
                monitor.check_interval as i64,
                monitor.timeout as i64,
                monitor.failure_threshold as i64,
                monitor.failure_count as i64,
                monitor.is_active as i64,
                monitor.status.as_str(),
                monitor.response_code as i64,
                monitor.response_time as i64,
                monitor.last_checked.map(unix_seconds),
                unix_seconds(SystemTime::now()),
                monitor.id.to_string(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute("DELETE FROM monitors WHERE id = ?", params![id.to_string()]).await?;
        Ok(())
    }
}

#[async_trait]
impl LogRepository for Store {
    async fn append(&self, entry: &LogEntry) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO logs (id, monitor_id, status, message, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                entry.id.to_string(),
                entry.monitor_id.to_string(),
                entry.status.as_str(),
                entry.message.clone(),
                unix_seconds(entry.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_for_monitor(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, monitor_id, status, message, created_at FROM logs \
                 WHERE monitor_id = ? ORDER BY created_at DESC LIMIT ?",
                params![monitor_id.to_string(), limit as i64],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let monitor_id: String = row.get(1)?;
            let status: String = row.get(2)?;
            entries.push(LogEntry {
                id: Uuid::parse_str(&id)?,
                monitor_id: Uuid::parse_str(&monitor_id)?,
                status: MonitorStatus::parse(&status),
                message: row.get(3)?,
                created_at: from_unix_seconds(row.get(4)?),
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl CredentialResolver for Store {
    async fn resolve(&self, credential_id: Uuid) -> Result<AuthHeader> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, profile_id, name, kind, token, username, password, header_name, \
                 header_value FROM credentials WHERE id = ?",
                params![credential_id.to_string()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Err(anyhow!("credential {credential_id} not found"));
        };

        let id: String = row.get(0)?;
        let profile_id: String = row.get(1)?;
        let kind: String = row.get(3)?;
        let credential = Credential {
            id: Uuid::parse_str(&id)?,
            profile_id: Uuid::parse_str(&profile_id)?,
            name: row.get(2)?,
            kind: CredentialKind::parse(&kind),
            token: row.get(4)?,
            username: row.get(5)?,
            password: row.get(6)?,
            header_name: row.get(7)?,
            header_value: row.get(8)?,
        };
        Ok(credential.rendered_header())
    }
}

#[async_trait]
impl NotificationMethodSource for Store {
    async fn list_for_profile(&self, profile_id: Uuid) -> Result<Vec<NotificationMethod>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, profile_id, kind, enabled, config FROM notification_methods \
                 WHERE profile_id = ? AND enabled = 1",
                params![profile_id.to_string()],
            )
            .await?;

        let mut methods = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let profile_id: String = row.get(1)?;
            let kind: String = row.get(2)?;
            let config: String = row.get(4)?;

            let Some(kind) = ChannelKind::parse(&kind) else {
                warn!("Skipping notification method {id} with unknown channel kind {kind}");
                continue;
            };
            let config = match serde_json::from_str(&config) {
                Ok(value) => value,
                Err(err) => {
                    warn!("Skipping notification method {id} with malformed config: {err}");
                    continue;
                }
            };

            methods.push(NotificationMethod {
                id: Uuid::parse_str(&id)?,
                profile_id: Uuid::parse_str(&profile_id)?,
                kind,
                enabled: row.get::<i64>(3)? != 0,
                config,
            });
        }
        Ok(methods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::LibsqlManager;
    use tempfile::TempDir;

    async fn create_test_store() -> Result<(Store, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test.db");

        let db = libsql::Builder::new_local(db_path.to_string_lossy().as_ref()).build().await?;
        let manager = LibsqlManager::new(db);
        let pool: LibsqlPool = deadpool::managed::Pool::builder(manager).build()?;

        let conn = pool.get().await?;
        super::super::migrations::run_migrations(&conn).await?;
        drop(conn);

        Ok((Store::new(pool), temp_dir))
    }

    #[tokio::test]
    async fn monitor_roundtrip() -> Result<()> {
        let (store, _dir) = create_test_store().await?;

        let mut monitor = Monitor::new("api", MonitorKind::Http, "https://example.com/health");
        monitor.status = MonitorStatus::Up; // must be reset to pending on create
        let created = store.create_monitor(&monitor).await?;
        assert_eq!(created.status, MonitorStatus::Pending);
        assert_eq!(created.failure_count, 0);

        let listed = store.list_for_active_profile().await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].profile_id, created.profile_id);

        let mut fetched = store.get(created.id).await?.expect("monitor should exist");
        fetched.status = MonitorStatus::Down;
        fetched.failure_count = 2;
        fetched.response_code = 503;
        fetched.last_checked = Some(SystemTime::now());
        store.update(&fetched).await?;

        let reread = store.get(created.id).await?.expect("monitor should exist");
        assert_eq!(reread.status, MonitorStatus::Down);
        assert_eq!(reread.failure_count, 2);
        assert_eq!(reread.response_code, 503);
        assert!(reread.last_checked.is_some());

        store.delete(created.id).await?;
        assert!(store.get(created.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn out_of_range_columns_are_clamped_on_load() -> Result<()> {
        let (store, _dir) = create_test_store().await?;

        let monitor = Monitor::new("db", MonitorKind::Postgres, "");
        let created = store.create_monitor(&monitor).await?;

        // SQLite columns are untyped; a row written by another tool can hold
        // values outside the u16 domain.
        let conn = store.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET response_code = 99999, db_port = 70000 WHERE id = ?",
            params![created.id.to_string()],
        )
        .await?;

        let loaded = store.get(created.id).await?.expect("monitor should exist");
        assert_eq!(loaded.response_code, u16::MAX);
        assert_eq!(loaded.db_port, Some(u16::MAX));
        Ok(())
    }

    #[tokio::test]
    async fn logs_are_append_only_history() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let monitor_id = Uuid::new_v4();

        store.append(&LogEntry::new(monitor_id, MonitorStatus::Down, "connection refused")).await?;
        store.append(&LogEntry::new(monitor_id, MonitorStatus::Up, "200 OK")).await?;

        let entries = store.list_for_monitor(monitor_id, 10).await?;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.status == MonitorStatus::Down));
        assert!(entries.iter().any(|e| e.status == MonitorStatus::Up));
        Ok(())
    }

    #[tokio::test]
    async fn credential_resolution_renders_header() -> Result<()> {
        let (store, _dir) = create_test_store().await?;

        let credential = Credential {
            id: Uuid::new_v4(),
            profile_id: Uuid::new_v4(),
            name: "token".to_string(),
            kind: CredentialKind::Bearer,
            token: "abc".to_string(),
            username: String::new(),
            password: String::new(),
            header_name: String::new(),
            header_value: String::new(),
        };
        store.create_credential(&credential).await?;

        let header = store.resolve(credential.id).await?;
        assert_eq!(header.name, "Authorization");
        assert_eq!(header.value, "Bearer abc");

        assert!(store.resolve(Uuid::new_v4()).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn disabled_notification_methods_are_filtered() -> Result<()> {
        let (store, _dir) = create_test_store().await?;
        let profile_id = Uuid::new_v4();

        let enabled = NotificationMethod {
            id: Uuid::new_v4(),
            profile_id,
            kind: ChannelKind::Slack,
            enabled: true,
            config: serde_json::json!({"webhook_url": "https://hooks.example.com", "channel": "#ops"}),
        };
        let disabled = NotificationMethod {
            id: Uuid::new_v4(),
            profile_id,
            kind: ChannelKind::Email,
            enabled: false,
            config: serde_json::json!({}),
        };
        store.create_notification_method(&enabled).await?;
        store.create_notification_method(&disabled).await?;

        let methods = store.list_for_profile(profile_id).await?;
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].kind, ChannelKind::Slack);
        Ok(())
    }
}
