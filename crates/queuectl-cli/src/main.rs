//! queuectl - command line front end for the job queue.

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use queuectl_core::JobState;
use queuectl_core::ports::SettingKey;

#[derive(Debug, Parser)]
#[command(name = "queuectl", version, about = "Durable shell-command job queue")]
struct Cli {
    /// Directory holding the database, settings file and control socket.
    #[arg(long, global = true, env = "QUEUECTL_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add a job, e.g. '{"id":"job1","command":"sleep 2","max_retries":3}'
    Enqueue {
        /// Job description as a JSON object.
        job: String,
    },

    /// Run or control the worker pool
    #[command(subcommand)]
    Worker(WorkerCommand),

    /// Job counts per state and worker pool status
    Status,

    /// List jobs, newest first
    List {
        /// Only jobs in this state (pending, processing, completed, failed, dead)
        #[arg(long)]
        state: Option<JobState>,
    },

    /// Inspect or replay the dead letter queue
    #[command(subcommand)]
    Dlq(DlqCommand),

    /// Read or change settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum WorkerCommand {
    /// Start workers in this process and block until stopped
    Start {
        /// Number of concurrent workers
        #[arg(long, short, default_value_t = 1)]
        count: usize,
    },
    /// Ask the running pool to finish its current jobs and exit
    Stop,
    /// Show the running pool
    Status,
}

#[derive(Debug, Subcommand)]
enum DlqCommand {
    /// List dead jobs
    List,
    /// Move a dead job back to pending with attempts reset
    Retry { id: String },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Show one setting, or all of them
    Get { key: Option<SettingKey> },
    /// Change a setting (max_retries, backoff_base, poll_interval_seconds)
    Set { key: SettingKey, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    queuectl_core::observability::init_tracing(cli.log_json);

    let data_dir = cli.data_dir;
    match cli.command {
        Command::Enqueue { job } => commands::enqueue(&data_dir, &job).await,
        Command::Worker(WorkerCommand::Start { count }) => {
            commands::worker_start(&data_dir, count).await
        }
        Command::Worker(WorkerCommand::Stop) => commands::worker_stop(&data_dir).await,
        Command::Worker(WorkerCommand::Status) => commands::worker_status(&data_dir).await,
        Command::Status => commands::status(&data_dir).await,
        Command::List { state } => commands::list(&data_dir, state).await,
        Command::Dlq(DlqCommand::List) => commands::dlq_list(&data_dir).await,
        Command::Dlq(DlqCommand::Retry { id }) => commands::dlq_retry(&data_dir, &id).await,
        Command::Config(ConfigCommand::Get { key }) => commands::config_get(&data_dir, key),
        Command::Config(ConfigCommand::Set { key, value }) => {
            commands::config_set(&data_dir, key, &value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_worker_start_with_count() {
        let cli = Cli::try_parse_from(["queuectl", "worker", "start", "--count", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Worker(WorkerCommand::Start { count: 3 })
        ));
        assert_eq!(cli.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn parses_state_filter_and_rejects_unknown_states() {
        let cli = Cli::try_parse_from(["queuectl", "list", "--state", "dead"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::List {
                state: Some(JobState::Dead)
            }
        ));
        assert!(Cli::try_parse_from(["queuectl", "list", "--state", "zombie"]).is_err());
    }

    #[test]
    fn parses_config_set() {
        let cli = Cli::try_parse_from([
            "queuectl",
            "--data-dir",
            "/tmp/q",
            "config",
            "set",
            "backoff_base",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/q"));
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Set {
                key: SettingKey::BackoffBase,
                ..
            })
        ));
        assert!(Cli::try_parse_from(["queuectl", "config", "set", "speed", "3"]).is_err());
    }
}
