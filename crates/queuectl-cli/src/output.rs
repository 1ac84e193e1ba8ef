//! Human-readable rendering.

use chrono::SecondsFormat;
use queuectl_core::{Job, JobState, PoolStatus, StateCounts};

pub fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs.");
        return;
    }
    println!("{}", header());
    for job in jobs {
        println!("{}", job_row(job));
    }
}

pub fn print_counts(counts: &StateCounts) {
    println!("Jobs:");
    for state in JobState::ALL {
        println!("  {:<11} {}", state.as_str(), counts.get(state));
    }
    println!("  {:<11} {}", "total", counts.total());
}

pub fn print_pool_status(status: Option<&PoolStatus>) {
    match status {
        Some(status) if status.running => {
            let since = status
                .started_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "Workers: {} running in process {} since {}",
                status.workers, status.pid, since
            );
        }
        _ => println!("Workers: no worker pool running"),
    }
}

fn header() -> String {
    format!(
        "{:<28} {:<10} {:>8} {:<20} {}",
        "ID", "STATE", "ATTEMPTS", "UPDATED", "COMMAND"
    )
}

fn job_row(job: &Job) -> String {
    format!(
        "{:<28} {:<10} {:>8} {:<20} {}",
        job.id.as_str(),
        job.state.as_str(),
        format!("{}/{}", job.attempts, job.max_retries),
        job.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        job.command
    )
}
