//! Relational store access for services, sessions and attendance

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::models::{NewServiceSession, Service, ServiceSession, ServiceSessionUser};

/// Session store the materializer and reconciler depend on
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All services with `enable_scheduled = true`
    async fn fetch_scheduled_services(&self) -> Result<Vec<Service>>;

    /// Usernames currently on a service's roster
    async fn fetch_service_members(&self, service_id: i64) -> Result<Vec<String>>;

    /// Insert a session and return it with its generated id
    async fn create_session(&self, session: &NewServiceSession) -> Result<ServiceSession>;

    /// Insert attendance rows in bulk, returning the number inserted
    async fn create_attendance(&self, rows: &[ServiceSessionUser]) -> Result<u64>;

    /// Every session with its absolute start and end
    async fn fetch_sessions(&self) -> Result<Vec<ServiceSession>>;
}

/// PostgreSQL-backed session store
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn fetch_scheduled_services(&self) -> Result<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>(
            r#"
            SELECT service_id, name, day_of_week,
                   start_time::text AS start_time, end_time::text AS end_time,
                   service_hours, enable_scheduled, service_ic_username
            FROM services
            WHERE enable_scheduled = TRUE
            ORDER BY service_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(services)
    }

    async fn fetch_service_members(&self, service_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT username
            FROM user_services
            WHERE service_id = $1
            ORDER BY username
            "#,
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;

        let members = rows.into_iter().map(|row| row.get("username")).collect();

        Ok(members)
    }

    async fn create_session(&self, session: &NewServiceSession) -> Result<ServiceSession> {
        let created = sqlx::query_as::<_, ServiceSession>(
            r#"
            INSERT INTO service_sessions (service_id, start_time, end_time, ad_hoc_enabled, service_hours)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING service_session_id, service_id, start_time, end_time, ad_hoc_enabled, service_hours
            "#,
        )
        .bind(session.service_id)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.ad_hoc_enabled)
        .bind(session.service_hours)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn create_attendance(&self, rows: &[ServiceSessionUser]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO service_session_users (service_session_id, username, ad_hoc, attended, is_ic) ",
        );
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.service_session_id)
                .push_bind(row.username.clone())
                .push_bind(row.ad_hoc)
                .push_bind(row.attended.as_str())
                .push_bind(row.is_ic);
        });

        let result = builder.build().execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    async fn fetch_sessions(&self) -> Result<Vec<ServiceSession>> {
        let sessions = sqlx::query_as::<_, ServiceSession>(
            r#"
            SELECT service_session_id, service_id, start_time, end_time, ad_hoc_enabled, service_hours
            FROM service_sessions
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }
}
