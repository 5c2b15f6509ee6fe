//! Records the scheduler reads from and writes to the relational store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A recurring weekly activity, owned by the CRUD layer
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub service_id: i64,
    pub name: String,
    /// 0 = Monday ... 6 = Sunday
    pub day_of_week: i32,
    /// Local wall-clock `HH:MM`
    pub start_time: String,
    /// Local wall-clock `HH:MM`
    pub end_time: String,
    pub service_hours: i32,
    pub enable_scheduled: bool,
    pub service_ic_username: Option<String>,
}

/// One concrete occurrence of a service
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceSession {
    pub service_session_id: i64,
    pub service_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub ad_hoc_enabled: bool,
    pub service_hours: i32,
}

/// Session creation payload; the store assigns the id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewServiceSession {
    pub service_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub ad_hoc_enabled: bool,
    pub service_hours: i32,
}

/// Attendance status of one member for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Attended,
    Absent,
    #[serde(rename = "Valid Reason")]
    ValidReason,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Attended => "Attended",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::ValidReason => "Valid Reason",
        }
    }
}

/// Attendance row, keyed by `(service_session_id, username)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSessionUser {
    pub service_session_id: i64,
    pub username: String,
    pub ad_hoc: bool,
    pub attended: AttendanceStatus,
    pub is_ic: bool,
}
