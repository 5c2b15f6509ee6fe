//! Scheduler configuration
//!
//! Loaded from `SCHEDULER_*` environment variables on top of built-in
//! defaults. Cron expressions have a seconds field and are evaluated in UTC.
//!
//! # Environment Variables
//! - `SCHEDULER_MATERIALIZE_SCHEDULE` (default: Monday 00:00 UTC+8)
//! - `SCHEDULER_RECONCILE_SCHEDULE` (default: every minute)
//! - `SCHEDULER_DATABASE_BACKUP_SCHEDULE` (default: 03:00 UTC+8 daily)
//! - `SCHEDULER_OBJECT_STORE_BACKUP_SCHEDULE` (default: 03:30 UTC+8 daily)
//! - `SCHEDULER_TOKEN_NAMESPACE`: Redis hash holding live tokens
//! - `SCHEDULER_BACKUP_DIR`: staging directory for snapshots
//! - `SCHEDULER_BACKUP_RETENTION_DAYS` (default: 7)
//! - `SCHEDULER_OBJECT_STORE_PATH`: object store data directory (required)
//! - `SCHEDULER_DATABASE_BACKUP_COMMAND`: optional snapshot command override
//! - `SCHEDULER_OBJECT_STORE_BACKUP_COMMAND`: optional snapshot command override

use anyhow::{Context, Result};
use ::config::{Config, Environment};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub materialize_schedule: String,
    pub reconcile_schedule: String,
    pub database_backup_schedule: String,
    pub object_store_backup_schedule: String,
    pub token_namespace: String,
    pub backup_dir: PathBuf,
    pub backup_retention_days: u64,
    pub object_store_path: String,
    #[serde(default)]
    pub database_backup_command: Option<String>,
    #[serde(default)]
    pub object_store_backup_command: Option<String>,
}

impl SchedulerConfig {
    /// Load from the process environment. Missing required values are an
    /// error; the service refuses to start half-configured.
    pub fn from_env() -> Result<Self> {
        let config = Config::builder()
            .set_default("materialize_schedule", "0 0 16 * * Sun")?
            .set_default("reconcile_schedule", "0 * * * * *")?
            .set_default("database_backup_schedule", "0 0 19 * * *")?
            .set_default("object_store_backup_schedule", "0 30 19 * * *")?
            .set_default("token_namespace", "live_service_sessions")?
            .set_default("backup_dir", "backups")?
            .set_default("backup_retention_days", 7)?
            .add_source(Environment::with_prefix("SCHEDULER").try_parsing(true))
            .build()
            .context("Failed to read scheduler configuration")?;

        let config: SchedulerConfig = config
            .try_deserialize()
            .context("Invalid scheduler configuration")?;

        if config.object_store_path.trim().is_empty() {
            anyhow::bail!("SCHEDULER_OBJECT_STORE_PATH must not be empty");
        }
        if config.backup_retention_days == 0 {
            anyhow::bail!("SCHEDULER_BACKUP_RETENTION_DAYS must be at least 1");
        }
        if config.backup_retention_days.checked_mul(SECS_PER_DAY).is_none() {
            anyhow::bail!(
                "SCHEDULER_BACKUP_RETENTION_DAYS is too large: {}",
                config.backup_retention_days
            );
        }

        Ok(config)
    }

    pub fn backup_retention(&self) -> Duration {
        Duration::from_secs(self.backup_retention_days.saturating_mul(SECS_PER_DAY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "SCHEDULER_OBJECT_STORE_PATH",
        "SCHEDULER_BACKUP_RETENTION_DAYS",
        "SCHEDULER_RECONCILE_SCHEDULE",
        "SCHEDULER_TOKEN_NAMESPACE",
        "SCHEDULER_DATABASE_BACKUP_COMMAND",
    ];

    fn clear() {
        for var in VARS {
            unsafe {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        unsafe {
            std::env::set_var("SCHEDULER_OBJECT_STORE_PATH", "/data/objects");
        }

        let config = SchedulerConfig::from_env().unwrap();
        assert_eq!(config.materialize_schedule, "0 0 16 * * Sun");
        assert_eq!(config.reconcile_schedule, "0 * * * * *");
        assert_eq!(config.token_namespace, "live_service_sessions");
        assert_eq!(config.backup_dir, PathBuf::from("backups"));
        assert_eq!(config.backup_retention(), Duration::from_secs(7 * 86_400));
        assert_eq!(config.object_store_path, "/data/objects");
        assert_eq!(config.database_backup_command, None);

        clear();
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        unsafe {
            std::env::set_var("SCHEDULER_OBJECT_STORE_PATH", "/data/objects");
            std::env::set_var("SCHEDULER_BACKUP_RETENTION_DAYS", "14");
            std::env::set_var("SCHEDULER_RECONCILE_SCHEDULE", "*/30 * * * * *");
            std::env::set_var("SCHEDULER_TOKEN_NAMESPACE", "tokens");
            std::env::set_var(
                "SCHEDULER_DATABASE_BACKUP_COMMAND",
                "pg_dumpall --file={output}",
            );
        }

        let config = SchedulerConfig::from_env().unwrap();
        assert_eq!(config.backup_retention_days, 14);
        assert_eq!(config.reconcile_schedule, "*/30 * * * * *");
        assert_eq!(config.token_namespace, "tokens");
        assert_eq!(
            config.database_backup_command.as_deref(),
            Some("pg_dumpall --file={output}")
        );

        clear();
    }

    #[test]
    #[serial]
    fn test_object_store_path_is_required() {
        clear();
        assert!(SchedulerConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_zero_retention_is_rejected() {
        clear();
        unsafe {
            std::env::set_var("SCHEDULER_OBJECT_STORE_PATH", "/data/objects");
            std::env::set_var("SCHEDULER_BACKUP_RETENTION_DAYS", "0");
        }

        assert!(SchedulerConfig::from_env().is_err());

        clear();
    }

    #[test]
    #[serial]
    fn test_oversized_retention_is_rejected() {
        clear();
        unsafe {
            std::env::set_var("SCHEDULER_OBJECT_STORE_PATH", "/data/objects");
            std::env::set_var("SCHEDULER_BACKUP_RETENTION_DAYS", "300000000000000");
        }

        let err = SchedulerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("too large"));

        clear();
    }
}
