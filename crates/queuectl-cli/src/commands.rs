//! Command handlers. Each opens what it needs from the data directory.

use std::path::Path;

use anyhow::{Context, Result};
use queuectl_core::impls::FileSettings;
use queuectl_core::ports::{SettingKey, SettingsProvider};
use queuectl_core::{App, AppBuilder, JobId, JobState, QueueError};
use tracing::info;

use crate::output;

async fn open(data_dir: &Path) -> Result<App> {
    AppBuilder::new(data_dir)
        .build()
        .await
        .with_context(|| format!("failed to open data directory {}", data_dir.display()))
}

pub async fn enqueue(data_dir: &Path, raw: &str) -> Result<()> {
    let app = open(data_dir).await?;
    let job = app.queue.submit_json(raw).await.context("failed to enqueue job")?;
    println!("Enqueued job {}", job.id);
    Ok(())
}

pub async fn list(data_dir: &Path, state: Option<JobState>) -> Result<()> {
    let app = open(data_dir).await?;
    let jobs = app.queue.list(state).await?;
    output::print_jobs(&jobs);
    Ok(())
}

pub async fn dlq_list(data_dir: &Path) -> Result<()> {
    let app = open(data_dir).await?;
    let jobs = app.queue.dead_letters().await?;
    if jobs.is_empty() {
        println!("Dead letter queue is empty.");
        return Ok(());
    }
    output::print_jobs(&jobs);
    Ok(())
}

pub async fn dlq_retry(data_dir: &Path, id: &str) -> Result<()> {
    let app = open(data_dir).await?;
    let id = JobId::parse(id)?;
    let job = app.queue.retry_dead(&id).await?;
    println!("Job {} moved back to pending.", job.id);
    Ok(())
}

pub async fn status(data_dir: &Path) -> Result<()> {
    let app = open(data_dir).await?;
    let counts = app.queue.summary().await?;
    output::print_counts(&counts);
    println!();
    output::print_pool_status(pool_status(data_dir).await?.as_ref());
    Ok(())
}

pub fn config_get(data_dir: &Path, key: Option<SettingKey>) -> Result<()> {
    let settings = FileSettings::in_dir(data_dir);
    match key {
        Some(key) => println!("{}", settings.get(key)?),
        None => {
            let current = settings.current();
            for key in SettingKey::ALL {
                println!("{key} = {}", current.get(key));
            }
        }
    }
    Ok(())
}

pub fn config_set(data_dir: &Path, key: SettingKey, value: &str) -> Result<()> {
    let settings = FileSettings::in_dir(data_dir);
    let updated = settings
        .set(key, value)
        .with_context(|| format!("failed to set {key}"))?;
    println!("{key} = {}", updated.get(key));
    Ok(())
}

#[cfg(unix)]
pub async fn worker_start(data_dir: &Path, count: usize) -> Result<()> {
    use queuectl_core::app::ControlServer;

    let app = open(data_dir).await?;
    let server = match ControlServer::bind(app.socket_path()).await {
        Err(QueueError::AlreadyRunning) => {
            anyhow::bail!(
                "a worker pool is already running for {}",
                data_dir.display()
            )
        }
        other => other?,
    };

    // Holding the control socket means no other pool owns this directory.
    recover_orphans(&app).await?;
    let pool = app.pool();
    let status = pool.start(count)?;
    println!(
        "Started {} worker(s) in process {}. Press Ctrl+C or run `queuectl worker stop` to stop.",
        status.workers, status.pid
    );

    let trigger = tokio::select! {
        served = server.run(&pool) => served.map_err(anyhow::Error::from),
        signal = shutdown_signal() => {
            info!("shutdown signal received");
            signal
        }
    };

    // Stop the pool even if the control socket failed.
    println!("Stopping: waiting for running jobs to finish...");
    pool.stop().await?;
    drop(server);
    println!("Worker pool stopped.");
    trigger
}

#[cfg(not(unix))]
pub async fn worker_start(data_dir: &Path, count: usize) -> Result<()> {
    let app = open(data_dir).await?;
    recover_orphans(&app).await?;
    let pool = app.pool();
    let status = pool.start(count)?;
    println!(
        "Started {} worker(s) in process {}. Press Ctrl+C to stop.",
        status.workers, status.pid
    );

    tokio::signal::ctrl_c().await?;
    println!("Stopping: waiting for running jobs to finish...");
    pool.stop().await?;
    println!("Worker pool stopped.");
    Ok(())
}

async fn recover_orphans(app: &App) -> Result<()> {
    let recovered = app
        .queue
        .recover_orphans()
        .await
        .context("failed to recover jobs left by a previous pool")?;
    if recovered > 0 {
        println!("Requeued {recovered} job(s) left in flight by a previous pool.");
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        ctrl_c = tokio::signal::ctrl_c() => ctrl_c?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(unix)]
pub async fn worker_stop(data_dir: &Path) -> Result<()> {
    use queuectl_core::app::control::{self, ControlRequest, ControlResponse};

    match control::request(control::socket_path(data_dir), ControlRequest::Stop).await {
        Ok(ControlResponse::Stopping) => println!("Stop requested; running jobs will finish first."),
        Ok(ControlResponse::Error { message }) => anyhow::bail!("worker pool refused: {message}"),
        Ok(other) => anyhow::bail!("unexpected response: {other:?}"),
        Err(QueueError::NotRunning) => println!("No worker pool running."),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn worker_stop(_data_dir: &Path) -> Result<()> {
    anyhow::bail!("worker stop needs Unix domain sockets; press Ctrl+C in the worker's console")
}

pub async fn worker_status(data_dir: &Path) -> Result<()> {
    output::print_pool_status(pool_status(data_dir).await?.as_ref());
    Ok(())
}

/// Status of the pool serving `data_dir`, or `None` when none is running.
#[cfg(unix)]
async fn pool_status(data_dir: &Path) -> Result<Option<queuectl_core::PoolStatus>> {
    use queuectl_core::app::control::{self, ControlRequest, ControlResponse};

    match control::request(control::socket_path(data_dir), ControlRequest::Status).await {
        Ok(ControlResponse::Status(status)) => Ok(Some(status)),
        Ok(ControlResponse::Error { message }) => anyhow::bail!("worker pool refused: {message}"),
        Ok(other) => anyhow::bail!("unexpected response: {other:?}"),
        Err(QueueError::NotRunning) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
async fn pool_status(_data_dir: &Path) -> Result<Option<queuectl_core::PoolStatus>> {
    Ok(None)
}
