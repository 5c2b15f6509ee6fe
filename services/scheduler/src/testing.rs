//! In-memory collaborators for unit tests

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::models::{NewServiceSession, Service, ServiceSession, ServiceSessionUser};
use crate::store::SessionStore;
use crate::token_store::TokenStore;

#[derive(Default)]
pub struct InMemorySessionStore {
    services: Vec<Service>,
    members: HashMap<i64, Vec<String>>,
    failing_rosters: HashSet<i64>,
    failing_session_inserts: HashSet<i64>,
    rejected_members: HashSet<String>,
    sessions: Mutex<Vec<ServiceSession>>,
    attendance: Mutex<Vec<ServiceSessionUser>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: Service, members: &[&str]) -> Self {
        self.members.insert(
            service.service_id,
            members.iter().map(|m| m.to_string()).collect(),
        );
        self.services.push(service);
        self
    }

    pub fn with_failing_roster(mut self, service_id: i64) -> Self {
        self.failing_rosters.insert(service_id);
        self
    }

    pub fn with_failing_session_insert(mut self, service_id: i64) -> Self {
        self.failing_session_inserts.insert(service_id);
        self
    }

    /// Attendance inserts naming `username` fail, as a foreign key would
    pub fn with_rejected_member(mut self, username: &str) -> Self {
        self.rejected_members.insert(username.to_string());
        self
    }

    pub fn with_session(self, session: ServiceSession) -> Self {
        self.sessions.lock().unwrap().push(session);
        self
    }

    pub fn sessions(&self) -> Vec<ServiceSession> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn attendance(&self) -> Vec<ServiceSessionUser> {
        self.attendance.lock().unwrap().clone()
    }

    pub fn remove_session(&self, service_session_id: i64) {
        self.sessions
            .lock()
            .unwrap()
            .retain(|s| s.service_session_id != service_session_id);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn fetch_scheduled_services(&self) -> Result<Vec<Service>> {
        Ok(self
            .services
            .iter()
            .filter(|s| s.enable_scheduled)
            .cloned()
            .collect())
    }

    async fn fetch_service_members(&self, service_id: i64) -> Result<Vec<String>> {
        if self.failing_rosters.contains(&service_id) {
            return Err(anyhow!("roster query failed for service {}", service_id));
        }
        Ok(self.members.get(&service_id).cloned().unwrap_or_default())
    }

    async fn create_session(&self, session: &NewServiceSession) -> Result<ServiceSession> {
        if self.failing_session_inserts.contains(&session.service_id) {
            return Err(anyhow!("session insert failed for service {}", session.service_id));
        }
        let mut sessions = self.sessions.lock().unwrap();
        let next_id = sessions
            .iter()
            .map(|s| s.service_session_id)
            .max()
            .unwrap_or(0)
            + 1;
        let created = ServiceSession {
            service_session_id: next_id,
            service_id: session.service_id,
            start_time: session.start_time,
            end_time: session.end_time,
            ad_hoc_enabled: session.ad_hoc_enabled,
            service_hours: session.service_hours,
        };
        sessions.push(created.clone());
        Ok(created)
    }

    async fn create_attendance(&self, rows: &[ServiceSessionUser]) -> Result<u64> {
        if let Some(row) = rows.iter().find(|r| self.rejected_members.contains(&r.username)) {
            return Err(anyhow!("unknown user {}", row.username));
        }
        self.attendance.lock().unwrap().extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn fetch_sessions(&self) -> Result<Vec<ServiceSession>> {
        Ok(self.sessions())
    }
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, token: &str, session_id: &str) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert(token.to_string(), session_id.to_string());
        self
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().unwrap().clone()
    }

    /// Tokens currently mapping to `service_session_id`
    pub fn tokens_for(&self, service_session_id: i64) -> Vec<String> {
        let id = service_session_id.to_string();
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, v)| **v == id)
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn entries(&self) -> Result<HashMap<String, String>> {
        Ok(self.snapshot())
    }

    async fn insert(&self, token: &str, session_id: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(token.to_string(), session_id.to_string());
        Ok(())
    }

    async fn remove(&self, token: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(token);
        Ok(())
    }
}

pub fn service(service_id: i64, day_of_week: i32, start: &str, end: &str) -> Service {
    Service {
        service_id,
        name: format!("service-{}", service_id),
        day_of_week,
        start_time: start.to_string(),
        end_time: end.to_string(),
        service_hours: 2,
        enable_scheduled: true,
        service_ic_username: None,
    }
}

pub fn session(
    service_session_id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> ServiceSession {
    ServiceSession {
        service_session_id,
        service_id: 1,
        start_time,
        end_time,
        ad_hoc_enabled: false,
        service_hours: 2,
    }
}
