//! Weekly materialization of service sessions
//!
//! Every schedule-enabled service gets one session for the current week
//! and one `Absent` attendance row per member on its roster.
//!
//! Each invocation creates a fresh set of sessions. Running it twice in the
//! same week produces duplicates; triggering it at most once per week is
//! the caller's job (the weekly cron job, or an operator backfilling a
//! missed week by hand).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::jobs::ScheduledTask;
use crate::models::{AttendanceStatus, NewServiceSession, Service, ServiceSessionUser};
use crate::store::SessionStore;
use crate::time_window::session_window;

/// Outcome of one materialization pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub sessions_created: usize,
    pub attendance_rows: u64,
    /// Services whose session was created without attendance rows
    pub roster_failures: Vec<i64>,
    /// Services skipped because their schedule could not be resolved
    pub skipped_services: Vec<i64>,
    /// Services whose session or attendance insert was rejected
    pub insert_failures: Vec<i64>,
}

pub struct SessionMaterializer {
    store: Arc<dyn SessionStore>,
}

impl SessionMaterializer {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Materialize this week's sessions for every scheduled service.
    ///
    /// A roster, schedule or insert problem is confined to its own service.
    /// Only failing to list the scheduled services aborts the pass.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<MaterializeReport> {
        let mut report = MaterializeReport::default();

        let services = self.store.fetch_scheduled_services().await?;
        if services.is_empty() {
            info!("No scheduled services to materialize");
            return Ok(report);
        }

        info!("Materializing sessions for {} services", services.len());

        for service in services {
            let (start_time, end_time) = match session_window(
                service.day_of_week,
                &service.start_time,
                &service.end_time,
                now,
            ) {
                Ok(window) => window,
                Err(e) => {
                    warn!(
                        "Skipping service {} ({}): {}",
                        service.service_id, service.name, e
                    );
                    report.skipped_services.push(service.service_id);
                    continue;
                }
            };

            let session = match self
                .store
                .create_session(&NewServiceSession {
                    service_id: service.service_id,
                    start_time,
                    end_time,
                    ad_hoc_enabled: false,
                    service_hours: service.service_hours,
                })
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    warn!(
                        "Failed to create session for service {} ({}): {:#}",
                        service.service_id, service.name, e
                    );
                    report.insert_failures.push(service.service_id);
                    continue;
                }
            };
            report.sessions_created += 1;

            let members = match self.store.fetch_service_members(service.service_id).await {
                Ok(members) => members,
                Err(e) => {
                    warn!(
                        "Session {} for service {} created with no attendance rows, roster fetch failed: {}",
                        session.service_session_id, service.service_id, e
                    );
                    report.roster_failures.push(service.service_id);
                    continue;
                }
            };

            let rows = attendance_rows(&service, session.service_session_id, members);
            match self.store.create_attendance(&rows).await {
                Ok(inserted) => report.attendance_rows += inserted,
                Err(e) => {
                    warn!(
                        "Session {} for service {} created with no attendance rows, insert failed: {:#}",
                        session.service_session_id, service.service_id, e
                    );
                    report.insert_failures.push(service.service_id);
                    continue;
                }
            }

            info!(
                "Created session {} for service {} with {} attendance rows",
                session.service_session_id,
                service.service_id,
                rows.len()
            );
        }

        Ok(report)
    }
}

fn attendance_rows(
    service: &Service,
    service_session_id: i64,
    members: Vec<String>,
) -> Vec<ServiceSessionUser> {
    members
        .into_iter()
        .map(|username| ServiceSessionUser {
            service_session_id,
            is_ic: service.service_ic_username.as_deref() == Some(username.as_str()),
            username,
            ad_hoc: false,
            attended: AttendanceStatus::Absent,
        })
        .collect()
}

#[async_trait]
impl ScheduledTask for SessionMaterializer {
    fn name(&self) -> &'static str {
        "materialize"
    }

    async fn run_once(&self, now: DateTime<Utc>) -> Result<()> {
        let report = self.run(now).await?;
        info!(
            "Materialization finished: {} sessions, {} attendance rows, {} roster failures, {} insert failures, {} skipped",
            report.sessions_created,
            report.attendance_rows,
            report.roster_failures.len(),
            report.insert_failures.len(),
            report.skipped_services.len()
        );
        Ok(())
    }
}
