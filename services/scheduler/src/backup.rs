//! Daily snapshots of the relational store and the object store
//!
//! Each backup task ensures the staging directory exists, sweeps entries
//! older than the retention period, then runs an external snapshot tool
//! that writes `<prefix>_<DD_MM_YYYY>.<ext>` into the staging directory.
//! Moving artifacts off the host is handled elsewhere.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::process::Command;
use tracing::{info, warn};
use url::Url;

use crate::error::BackupError;
use crate::jobs::ScheduledTask;
use crate::time_window::target_timezone;

/// Default retention of staged artifacts
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const OUTPUT_PLACEHOLDER: &str = "{output}";

/// External snapshot tool invocation. `{output}` in any argument is replaced
/// with the artifact path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotCommand {
    program: String,
    args: Vec<String>,
}

impl SnapshotCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a whitespace-separated command template
    pub fn parse(template: &str) -> Result<Self, BackupError> {
        let mut parts = template.split_whitespace();
        let program = parts.next().ok_or(BackupError::EmptyCommand)?;
        Ok(Self::new(program, parts))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn render(&self, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output))
            .collect()
    }
}

/// Outcome of one backup cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub artifact: PathBuf,
    pub pruned: usize,
}

pub struct BackupTask {
    name: &'static str,
    staging_dir: PathBuf,
    prefix: String,
    extension: String,
    retention: Duration,
    command: SnapshotCommand,
    env: Vec<(String, String)>,
}

impl BackupTask {
    pub fn new(
        name: &'static str,
        staging_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
        command: SnapshotCommand,
    ) -> Self {
        Self {
            name,
            staging_dir: staging_dir.into(),
            prefix: prefix.into(),
            extension: extension.into(),
            retention: DEFAULT_RETENTION,
            command,
            env: Vec::new(),
        }
    }

    /// PostgreSQL dump in custom format via `pg_dump`.
    ///
    /// The password is handed over as `PGPASSWORD` so it never appears on
    /// the tool's command line.
    pub fn database(
        staging_dir: impl Into<PathBuf>,
        database_url: &str,
    ) -> Result<Self, BackupError> {
        let (connection, password) = split_password(database_url)?;
        let task = Self::new(
            "backup-database",
            staging_dir,
            "db",
            "dump",
            SnapshotCommand::new(
                "pg_dump",
                ["--format=custom", "--file={output}", connection.as_str()],
            ),
        );
        Ok(match password {
            Some(password) => task.with_env("PGPASSWORD", password),
            None => task,
        })
    }

    /// Gzipped tarball of the object store's data directory
    pub fn object_store(staging_dir: impl Into<PathBuf>, object_store_path: &str) -> Self {
        Self::new(
            "backup-object-store",
            staging_dir,
            "object_store",
            "tar.gz",
            SnapshotCommand::new("tar", ["-czf", "{output}", "-C", object_store_path, "."]),
        )
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_command(mut self, command: SnapshotCommand) -> Self {
        self.command = command;
        self
    }

    /// Extra environment for the snapshot tool, kept across command overrides
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Artifact file name for a snapshot taken at `now`, dated in the
    /// organisational timezone
    pub fn artifact_name(&self, now: DateTime<Utc>) -> String {
        let date = now.with_timezone(&target_timezone()).format("%d_%m_%Y");
        if self.extension.is_empty() {
            format!("{}_{}", self.prefix, date)
        } else {
            format!("{}_{}.{}", self.prefix, date, self.extension)
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<BackupReport, BackupError> {
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|source| BackupError::Staging {
                path: self.staging_dir.clone(),
                source,
            })?;

        let pruned = prune_staging(&self.staging_dir, self.retention, now.into()).await?;

        let artifact = self.staging_dir.join(self.artifact_name(now));
        info!("Creating snapshot {}", artifact.display());

        let output = Command::new(self.command.program())
            .args(self.command.render(&artifact))
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .await
            .map_err(|source| BackupError::Spawn {
                program: self.command.program().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(BackupError::ToolFailed {
                program: self.command.program().to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(BackupReport { artifact, pruned })
    }
}

/// Strip the password from a connection URL, returning the URL without it
/// and the decoded password
fn split_password(database_url: &str) -> Result<(String, Option<String>), BackupError> {
    let mut url = Url::parse(database_url)
        .map_err(|e| BackupError::InvalidDatabaseUrl(e.to_string()))?;

    let password = match url.password() {
        Some(encoded) => Some(
            urlencoding::decode(encoded)
                .map_err(|e| BackupError::InvalidDatabaseUrl(e.to_string()))?
                .into_owned(),
        ),
        None => None,
    };
    if password.is_some() {
        url.set_password(None)
            .map_err(|_| BackupError::InvalidDatabaseUrl("cannot remove password".to_string()))?;
    }

    Ok((url.to_string(), password))
}

/// Delete staged files and directories last modified more than `retention`
/// before `now`. Returns how many entries were removed.
pub async fn prune_staging(
    dir: &Path,
    retention: Duration,
    now: SystemTime,
) -> Result<usize, BackupError> {
    let staging_error = |source: std::io::Error| BackupError::Staging {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(staging_error)?;
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await.map_err(staging_error)? {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Cannot stat {}: {}", path.display(), e);
                continue;
            }
        };

        let expired = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);
        if !expired {
            continue;
        }

        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => {
                info!("Removed expired backup {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Failed to remove expired backup {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}

#[async_trait]
impl ScheduledTask for BackupTask {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run_once(&self, now: DateTime<Utc>) -> Result<()> {
        let report = self.run(now).await?;
        info!(
            "{} finished: {} ({} expired backups removed)",
            self.name,
            report.artifact.display(),
            report.pruned
        );
        Ok(())
    }
}
