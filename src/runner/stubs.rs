use std::time::Duration;

use crate::domain::CommandResult;
use crate::runner::traits::{ProcessRunner, RunOptions, RunnerError};

/// Runner returning a canned result after a fixed delay. Records nothing,
/// spawns nothing; for wiring the engine in tests.
#[derive(Debug, Clone)]
pub struct StubRunner {
    result: Result<CommandResult, RunnerError>,
    delay: Duration,
}

impl StubRunner {
    pub fn new(result: Result<CommandResult, RunnerError>, delay: Duration) -> Self {
        Self { result, delay }
    }

    pub fn passing() -> Self {
        Self::new(
            Ok(CommandResult {
                exit_status: Some(0),
                ..CommandResult::default()
            }),
            Duration::ZERO,
        )
    }
}

#[async_trait::async_trait]
impl ProcessRunner for StubRunner {
    #[tracing::instrument]
    async fn run(
        &self,
        command: &[String],
        _opts: &RunOptions,
    ) -> Result<CommandResult, RunnerError> {
        tracing::debug!("Stub execution: command={:?}", command);
        tokio::time::sleep(self.delay).await;

        let mut result = self.result.clone();
        if let Ok(r) = &mut result {
            r.command = command.join(" ");
            r.args = command.to_vec();
        }
        result
    }
}
