//! Persistence layer
//!
//! LibSQL-backed storage for monitors, check logs, credentials and
//! notification methods, exposed to the monitoring engine through narrow
//! repository traits.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{
    CredentialResolver, LogRepository, MonitorRepository, NotificationMethodSource, Store,
};
