//! Shell command executor.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::error;

use crate::domain::Outcome;
use crate::ports::CommandExecutor;

/// Runs commands through the platform shell (`sh -c`, or `cmd /C` on
/// Windows). Stdin is closed; stdout and stderr are inherited so job output
/// shows up live. There is no timeout: a command that never exits blocks its
/// worker.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    flag: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        if cfg!(windows) {
            Self::with_shell("cmd", "/C")
        } else {
            Self::with_shell("sh", "-c")
        }
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(shell: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            flag: flag.into(),
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str) -> Outcome {
        let status = Command::new(&self.shell)
            .arg(&self.flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Outcome::success(),
            Ok(status) => match status.code() {
                Some(code) => Outcome::exit_failure(code),
                None => Outcome::failure("terminated by signal"),
            },
            Err(err) => {
                error!(shell = %self.shell, command, error = %err, "failed to spawn command");
                Outcome::spawn_failure(&err)
            }
        }
    }
}
