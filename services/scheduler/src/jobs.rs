//! Cron wiring for the scheduler's periodic tasks
//!
//! Each task exposes a single `run_once` entry point. [`TaskRunner`] adds
//! the task-boundary policy: errors are logged and swallowed, and a firing
//! that finds the previous run of the same task still in flight is skipped.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

/// A unit of periodic work
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// Stable task name used in logs and on the command line
    fn name(&self) -> &'static str;

    /// Run one cycle as of `now`
    async fn run_once(&self, now: DateTime<Utc>) -> Result<()>;
}

/// Wraps a task with an in-flight guard and error logging
#[derive(Clone)]
pub struct TaskRunner {
    task: Arc<dyn ScheduledTask>,
    in_flight: Arc<Mutex<()>>,
}

impl TaskRunner {
    pub fn new(task: Arc<dyn ScheduledTask>) -> Self {
        Self {
            task,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.task.name()
    }

    /// Run the task now. Returns `false` when skipped because a previous
    /// run is still in flight.
    pub async fn fire(&self) -> bool {
        self.fire_at(Utc::now()).await
    }

    pub async fn fire_at(&self, now: DateTime<Utc>) -> bool {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!(
                "Skipping {} run, previous run is still in progress",
                self.name()
            );
            return false;
        };

        debug!("{} job executed", self.name());
        if let Err(e) = self.task.run_once(now).await {
            error!("{} run failed: {:#}", self.name(), e);
        }
        true
    }
}

/// A task paired with its cron expression (seconds-resolution, UTC)
pub struct JobDefinition {
    pub schedule: String,
    pub runner: TaskRunner,
}

impl JobDefinition {
    pub fn new(schedule: impl Into<String>, task: Arc<dyn ScheduledTask>) -> Self {
        Self {
            schedule: schedule.into(),
            runner: TaskRunner::new(task),
        }
    }

    fn into_job(self) -> Result<Job> {
        let runner = self.runner;
        let job = Job::new_async(self.schedule.as_str(), move |_, _| {
            let runner = runner.clone();
            Box::pin(async move {
                runner.fire().await;
            })
        })?;
        Ok(job)
    }
}

/// Register every job and start the scheduler.
///
/// The returned handle must be kept alive; shutting it down stops all jobs.
/// An invalid cron expression fails the whole start.
pub async fn start_scheduler(definitions: Vec<JobDefinition>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    for definition in definitions {
        let name = definition.runner.name();
        let schedule = definition.schedule.clone();
        let job = definition
            .into_job()
            .map_err(|e| anyhow::anyhow!("Invalid schedule {:?} for {}: {}", schedule, name, e))?;
        scheduler.add(job).await?;
        info!("Registered {} job with schedule: {}", name, schedule);
    }

    scheduler.start().await?;
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct BlockingTask {
        runs: AtomicUsize,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ScheduledTask for BlockingTask {
        fn name(&self) -> &'static str {
            "blocking"
        }

        async fn run_once(&self, _now: DateTime<Utc>) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    struct FailingTask {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledTask for FailingTask {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run_once(&self, _now: DateTime<Utc>) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("store unavailable")
        }
    }

    #[tokio::test]
    async fn test_overlapping_fire_is_skipped() {
        let task = Arc::new(BlockingTask {
            runs: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        });
        let runner = TaskRunner::new(task.clone());

        let first = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.fire().await })
        };
        task.started.notified().await;

        assert!(!runner.fire().await);

        task.release.notify_one();
        assert!(first.await.unwrap());
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_escape_runner() {
        let task = Arc::new(FailingTask {
            runs: AtomicUsize::new(0),
        });
        let runner = TaskRunner::new(task.clone());

        assert!(runner.fire().await);
        assert!(runner.fire().await);
        assert_eq!(task.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_schedule_is_rejected() {
        let task = Arc::new(FailingTask {
            runs: AtomicUsize::new(0),
        });

        let result = start_scheduler(vec![JobDefinition::new("every minute", task)]).await;

        assert!(result.is_err());
    }
}
