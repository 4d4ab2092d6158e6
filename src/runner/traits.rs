use std::path::PathBuf;
use std::time::Duration;

use crate::domain::CommandResult;

/// Per-invocation knobs for a process run.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Log the command line before spawning.
    pub verbose: bool,
    /// Treat a non-zero exit status as a normal outcome instead of
    /// `RunnerError::CommandFailed`.
    pub ignore_status: bool,
    /// Wall-clock budget for the child. The child is terminated with
    /// SIGTERM, then SIGKILL after a grace period, once exceeded.
    pub timeout: Option<Duration>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RunnerError {
    /// The process ran and exited non-zero while a zero status was
    /// required. Carries the full result so callers keep the captured
    /// output for diagnosis.
    #[error("command '{}' exited with status {:?}", .result.command, .result.exit_status)]
    CommandFailed { result: CommandResult },

    /// The executable could not be located at all, as opposed to having
    /// run and exited non-zero. Lists every directory searched.
    #[error("command '{command}' could not be found in any of: {searched:?}")]
    NotFound {
        command: String,
        searched: Vec<PathBuf>,
    },

    /// The child was terminated by a timeout or an external interrupt.
    /// Output captured up to that point is retained.
    #[error("command '{}' interrupted after {:?}", .result.command, .result.duration)]
    Interrupted { result: CommandResult },

    #[error("failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessRunner: std::fmt::Debug + Send + Sync {
    /// Execute one command line to completion and capture its output.
    async fn run(
        &self,
        command: &[String],
        opts: &RunOptions,
    ) -> Result<CommandResult, RunnerError>;
}
