//! Live attendance window reconciliation
//!
//! A session is live from `start_time - grace` to `end_time + grace`
//! inclusive. While live it has exactly one verification token in the
//! token store; outside that range it has none. Each cycle brings the
//! token store back in line with the session table and then removes ghost
//! entries, i.e. tokens pointing at sessions that no longer exist.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::jobs::ScheduledTask;
use crate::models::ServiceSession;
use crate::store::SessionStore;
use crate::token_store::TokenStore;

/// Minutes either side of a session during which it accepts check-ins
pub const GRACE_MINUTES: i64 = 10;

/// Random bytes per token before hex encoding
pub const TOKEN_BYTES: usize = 128;

/// Outcome of one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub live_sessions: usize,
    pub tokens_issued: usize,
    pub tokens_expired: usize,
    pub duplicates_removed: usize,
    pub ghosts_removed: usize,
}

pub struct LiveWindowReconciler {
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<dyn TokenStore>,
    grace: Duration,
}

impl LiveWindowReconciler {
    pub fn new(sessions: Arc<dyn SessionStore>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            sessions,
            tokens,
            grace: Duration::minutes(GRACE_MINUTES),
        }
    }

    /// Whether `session` accepts check-ins at `now`
    pub fn is_live(&self, session: &ServiceSession, now: DateTime<Utc>) -> bool {
        now >= session.start_time - self.grace && now <= session.end_time + self.grace
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let sessions = self.sessions.fetch_sessions().await?;
        let current = self.tokens.entries().await?;

        let mut by_session: HashMap<&str, Vec<&str>> = HashMap::new();
        for (token, session_id) in &current {
            by_session
                .entry(session_id.as_str())
                .or_default()
                .push(token.as_str());
        }
        let mut issued: HashSet<String> = HashSet::new();

        for session in &sessions {
            let session_id = session.service_session_id.to_string();
            let mut existing = by_session.remove(session_id.as_str()).unwrap_or_default();
            existing.sort_unstable();

            if self.is_live(session, now) {
                report.live_sessions += 1;

                match existing.split_first() {
                    None => {
                        let token = loop {
                            let candidate = generate_token();
                            if !current.contains_key(&candidate) && !issued.contains(&candidate) {
                                break candidate;
                            }
                        };
                        self.tokens.insert(&token, &session_id).await?;
                        debug!("Issued token for session {}", session_id);
                        issued.insert(token);
                        report.tokens_issued += 1;
                    }
                    Some((_, extra)) => {
                        for token in extra {
                            self.tokens.remove(token).await?;
                            report.duplicates_removed += 1;
                        }
                    }
                }
            } else {
                for token in existing {
                    self.tokens.remove(token).await?;
                    debug!("Expired token for session {}", session_id);
                    report.tokens_expired += 1;
                }
            }
        }

        report.ghosts_removed = self.remove_ghosts(&sessions).await?;

        Ok(report)
    }

    /// Delete tokens whose session id is unknown or malformed. Reads the
    /// token table again so this cycle's own insertions are seen.
    async fn remove_ghosts(&self, sessions: &[ServiceSession]) -> Result<usize> {
        let known: HashSet<i64> = sessions.iter().map(|s| s.service_session_id).collect();
        let mut removed = 0;

        for (token, session_id) in self.tokens.entries().await? {
            let is_known = session_id
                .parse::<i64>()
                .map(|id| known.contains(&id))
                .unwrap_or(false);
            if !is_known {
                self.tokens.remove(&token).await?;
                debug!("Removed ghost token for session {:?}", session_id);
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Fresh token from the thread-local CSPRNG, hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[async_trait]
impl ScheduledTask for LiveWindowReconciler {
    fn name(&self) -> &'static str {
        "reconcile"
    }

    async fn run_once(&self, now: DateTime<Utc>) -> Result<()> {
        let report = self.run(now).await?;
        let changes = report.tokens_issued
            + report.tokens_expired
            + report.duplicates_removed
            + report.ghosts_removed;
        if changes > 0 {
            info!(
                "Reconciled live sessions: {} live, {} issued, {} expired, {} duplicates and {} ghosts removed",
                report.live_sessions,
                report.tokens_issued,
                report.tokens_expired,
                report.duplicates_removed,
                report.ghosts_removed
            );
        } else {
            debug!("Reconciled live sessions: {} live", report.live_sessions);
        }
        Ok(())
    }
}
