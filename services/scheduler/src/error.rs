//! Error types for the scheduler service

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning a weekly schedule into concrete timestamps
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimeWindowError {
    /// Day of week outside 0 (Monday) ..= 6 (Sunday)
    #[error("Invalid day of week: {0}")]
    InvalidDayOfWeek(i32),

    /// Wall-clock time not in `HH:MM` form
    #[error("Invalid time of day: {0:?}")]
    InvalidTime(String),

    /// Local date-time that cannot be represented in the target timezone
    #[error("Unrepresentable local time")]
    Unrepresentable,
}

/// Errors raised by a backup cycle
#[derive(Error, Debug)]
pub enum BackupError {
    /// Staging directory could not be created or swept
    #[error("Staging directory error at {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot tool could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot tool exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// Snapshot command template is empty
    #[error("Snapshot command is empty")]
    EmptyCommand,

    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
}
