use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod backup;
mod error;
mod jobs;
mod materializer;
mod models;
mod reconciler;
mod settings;
mod store;
mod time_window;
mod token_store;

#[cfg(test)]
mod testing;

use backup::{BackupTask, SnapshotCommand};
use common::cache::{RedisConfig, RedisPool};
use common::database::{DatabaseConfig, health_check, init_pool};
use jobs::{JobDefinition, ScheduledTask, start_scheduler};
use materializer::SessionMaterializer;
use reconciler::LiveWindowReconciler;
use settings::SchedulerConfig;
use store::{PgSessionStore, SessionStore};
use token_store::{RedisTokenStore, TokenStore};

const USAGE: &str = "usage: scheduler [run <materialize|reconcile|backup-database|backup-object-store>]";

/// What the process was asked to do
#[derive(Debug, PartialEq, Eq)]
enum Mode {
    /// Run every task on its schedule until interrupted
    Daemon,
    /// Run a single task once and exit
    RunOnce(String),
}

fn parse_mode(mut args: impl Iterator<Item = String>) -> Result<Mode> {
    match (args.next(), args.next(), args.next()) {
        (None, _, _) => Ok(Mode::Daemon),
        (Some(cmd), Some(task), None) if cmd == "run" => Ok(Mode::RunOnce(task)),
        _ => anyhow::bail!(USAGE),
    }
}

/// Every task paired with its cron expression
fn build_tasks(
    config: &SchedulerConfig,
    database_url: &str,
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<dyn TokenStore>,
) -> Result<Vec<(String, Arc<dyn ScheduledTask>)>> {
    let mut database_backup = BackupTask::database(&config.backup_dir, database_url)?
        .with_retention(config.backup_retention());
    if let Some(template) = &config.database_backup_command {
        database_backup = database_backup.with_command(SnapshotCommand::parse(template)?);
    }

    let mut object_store_backup =
        BackupTask::object_store(&config.backup_dir, &config.object_store_path)
            .with_retention(config.backup_retention());
    if let Some(template) = &config.object_store_backup_command {
        object_store_backup = object_store_backup.with_command(SnapshotCommand::parse(template)?);
    }

    let materializer: Arc<dyn ScheduledTask> =
        Arc::new(SessionMaterializer::new(sessions.clone()));
    let reconciler: Arc<dyn ScheduledTask> = Arc::new(LiveWindowReconciler::new(sessions, tokens));
    let database_backup: Arc<dyn ScheduledTask> = Arc::new(database_backup);
    let object_store_backup: Arc<dyn ScheduledTask> = Arc::new(object_store_backup);

    Ok(vec![
        (config.materialize_schedule.clone(), materializer),
        (config.reconcile_schedule.clone(), reconciler),
        (config.database_backup_schedule.clone(), database_backup),
        (
            config.object_store_backup_schedule.clone(),
            object_store_backup,
        ),
    ])
}

/// Await `stop`, then close the pool whether or not it succeeded
async fn close_after(stop: impl Future<Output = Result<()>>, pool: &PgPool) -> Result<()> {
    let result = stop.await;
    pool.close().await;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mode = parse_mode(std::env::args().skip(1))?;

    info!("Starting club scheduler service");

    // Configuration problems are fatal
    let db_config = DatabaseConfig::from_env()?;
    let redis_config = RedisConfig::from_env()?;
    let config = SchedulerConfig::from_env()?;

    let pool = init_pool(&db_config).await?;
    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    let redis_pool = RedisPool::new(&redis_config).await?;
    if redis_pool.health_check().await? {
        info!("Redis connection successful");
    } else {
        anyhow::bail!("Failed to connect to Redis");
    }

    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));
    let tokens: Arc<dyn TokenStore> = Arc::new(RedisTokenStore::new(
        redis_pool,
        config.token_namespace.clone(),
    ));
    let tasks = build_tasks(&config, &db_config.database_url, sessions, tokens)?;

    match mode {
        Mode::RunOnce(name) => {
            let (_, task) = tasks
                .into_iter()
                .find(|(_, task)| task.name() == name)
                .ok_or_else(|| anyhow::anyhow!("Unknown task {:?}\n{}", name, USAGE))?;

            info!("Running {} once", name);
            let result = task.run_once(Utc::now()).await;
            pool.close().await;
            result?;
        }
        Mode::Daemon => {
            let definitions = tasks
                .into_iter()
                .map(|(schedule, task)| JobDefinition::new(schedule, task))
                .collect();
            let mut scheduler = start_scheduler(definitions).await?;

            info!("Club scheduler service started successfully");

            tokio::signal::ctrl_c().await?;
            info!("Shutting down club scheduler service");

            close_after(
                async { scheduler.shutdown().await.map_err(anyhow::Error::from) },
                &pool,
            )
            .await?;
        }
    }

    Ok(())
}
