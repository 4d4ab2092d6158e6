use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::domain::CommandResult;
use crate::runner::lookup::find_command;
use crate::runner::traits::{ProcessRunner, RunOptions, RunnerError};
use crate::runner::words;

const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Runs commands as local child processes with captured stdio.
///
/// Output is drained by dedicated reader tasks while the child is awaited,
/// so a child writing more than a pipe buffer of output cannot deadlock
/// against a parent that is only waiting for exit.
#[derive(Clone, Debug)]
pub struct LocalRunner {
    cancel: Option<watch::Receiver<bool>>,
    kill_grace: Duration,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRunner {
    pub fn new() -> Self {
        Self {
            cancel: None,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Observe an external interrupt signal. When the watched value turns
    /// true, the in-flight child is terminated and the run reports
    /// `RunnerError::Interrupted`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Resolve argv[0]: names containing a separator are taken as paths,
    /// bare names go through the search-path lookup.
    fn resolve_program(&self, name: &str) -> Result<String, RunnerError> {
        if name.contains('/') {
            Ok(name.to_string())
        } else {
            Ok(find_command(name)?.to_string_lossy().into_owned())
        }
    }
}

#[async_trait::async_trait]
impl ProcessRunner for LocalRunner {
    async fn run(
        &self,
        command: &[String],
        opts: &RunOptions,
    ) -> Result<CommandResult, RunnerError> {
        let Some(program) = command.first() else {
            return Err(RunnerError::Spawn {
                command: String::new(),
                message: "empty command line".to_string(),
            });
        };
        let mut result = CommandResult::new(command);

        if opts.verbose {
            tracing::info!("Running '{}'", result.command);
        }

        let program = self.resolve_program(program)?;
        let mut cmd = Command::new(&program);
        cmd.args(&command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunnerError::NotFound {
                    command: result.command.clone(),
                    searched: vec![program.clone().into()],
                }
            } else {
                RunnerError::Spawn {
                    command: result.command.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let stdout_task = drain_stdout(child.stdout.take());
        let stderr_task = drain_stderr(child.stderr.take());

        let mut cancel = self.cancel.clone();
        let deadline = opts.timeout.map(|t| start + t);

        let waited = {
            let expired = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            let interrupted = async {
                match cancel.as_mut() {
                    Some(rx) => {
                        let _ = rx.wait_for(|stop| *stop).await;
                    }
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                status = child.wait() => Some(status),
                _ = expired => None,
                _ = interrupted => None,
            }
        };

        match waited {
            Some(Ok(status)) => {
                // streams first, then the status: the result is never
                // published while its pipes are still being read
                result.stdout = join_drained(stdout_task).await;
                result.stderr = join_drained(stderr_task).await;
                result.duration = start.elapsed();
                result.exit_status = Some(unix_exit_code(status));

                if !status.success() && !opts.ignore_status {
                    return Err(RunnerError::CommandFailed { result });
                }
                Ok(result)
            }
            Some(Err(e)) => Err(RunnerError::Spawn {
                command: result.command.clone(),
                message: e.to_string(),
            }),
            None => {
                tracing::warn!("Terminating '{}'", result.command);
                let status = graceful_kill(&mut child, self.kill_grace).await;
                result.stdout = join_drained(stdout_task).await;
                result.stderr = join_drained(stderr_task).await;
                result.duration = start.elapsed();
                result.exit_status = status.map(unix_exit_code);
                Err(RunnerError::Interrupted { result })
            }
        }
    }
}

fn drain_stdout(pipe: Option<ChildStdout>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    })
}

fn drain_stderr(pipe: Option<ChildStderr>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    })
}

async fn join_drained(task: Option<JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(task) => String::from_utf8_lossy(&task.await.unwrap_or_default()).into_owned(),
        None => String::new(),
    }
}

/// Exit code in the shell convention: negative signal number when the
/// child died to a signal instead of exiting.
fn unix_exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(0))
}

/// SIGTERM first so the child may clean up, SIGKILL once the grace period
/// runs out. Always reaps the child.
async fn graceful_kill(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        // already reaped
        return child.try_wait().ok().flatten();
    };

    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

    tokio::select! {
        status = child.wait() => status.ok(),
        _ = tokio::time::sleep(grace) => {
            let _ = child.start_kill();
            child.wait().await.ok()
        }
    }
}

/// Run a command line given as a single string, shell-word split.
pub async fn run_command(
    cmd: &str,
    verbose: bool,
    ignore_status: bool,
) -> Result<CommandResult, RunnerError> {
    let args = words::split(cmd).map_err(|e| RunnerError::Spawn {
        command: cmd.to_string(),
        message: e.to_string(),
    })?;
    let opts = RunOptions {
        verbose,
        ignore_status,
        ..RunOptions::default()
    };
    LocalRunner::new().run(&args, &opts).await
}

/// Run a command line, returning only its exit code.
pub async fn system(cmd: &str, verbose: bool, ignore_status: bool) -> Result<i32, RunnerError> {
    let result = run_command(cmd, verbose, ignore_status).await?;
    Ok(result.exit_status.unwrap_or(-1))
}

/// Run a command line, returning only its captured stdout.
pub async fn system_output(
    cmd: &str,
    verbose: bool,
    ignore_status: bool,
) -> Result<String, RunnerError> {
    let result = run_command(cmd, verbose, ignore_status).await?;
    Ok(result.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_stdout_and_exit_zero() {
        let runner = LocalRunner::new();
        let result = runner
            .run(&args(&["echo", "fixed text"]), &RunOptions::default())
            .await
            .expect("echo should succeed");

        assert_eq!(result.exit_status, Some(0));
        assert_eq!(result.stdout, "fixed text\n");
        assert_eq!(result.stderr, "");
    }

    #[tokio::test]
    async fn test_run_captures_stderr() {
        let runner = LocalRunner::new();
        let result = runner
            .run(
                &args(&["sh", "-c", "echo oops >&2"]),
                &RunOptions::default(),
            )
            .await
            .expect("sh should succeed");

        assert_eq!(result.exit_status, Some(0));
        assert_eq!(result.stdout, "");
        assert_eq!(result.stderr, "oops\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_unless_ignored() {
        let runner = LocalRunner::new();
        let cmd = args(&["sh", "-c", "echo partial; exit 1"]);

        let err = runner
            .run(&cmd, &RunOptions::default())
            .await
            .expect_err("exit 1 must be an error");
        match err {
            RunnerError::CommandFailed { result } => {
                assert_eq!(result.exit_status, Some(1));
                assert_eq!(result.stdout, "partial\n");
            }
            other => panic!("Expected CommandFailed, got {:?}", other),
        }

        let opts = RunOptions {
            ignore_status: true,
            ..RunOptions::default()
        };
        let result = runner.run(&cmd, &opts).await.expect("ignored status");
        assert_eq!(result.exit_status, Some(1));
        assert_eq!(result.stdout, "partial\n");
    }

    #[tokio::test]
    async fn test_unknown_command_reports_not_found() {
        let runner = LocalRunner::new();
        let err = runner
            .run(&args(&["no-such-binary-4242"]), &RunOptions::default())
            .await
            .expect_err("lookup must fail");

        match err {
            RunnerError::NotFound { command, searched } => {
                assert_eq!(command, "no-such-binary-4242");
                assert!(!searched.is_empty());
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_large_output_does_not_deadlock() {
        // well past a pipe buffer
        let runner = LocalRunner::new();
        let result = runner
            .run(
                &args(&["sh", "-c", "yes x | head -c 262144"]),
                &RunOptions::default(),
            )
            .await
            .expect("should drain concurrently");

        assert_eq!(result.exit_status, Some(0));
        assert_eq!(result.stdout.len(), 262144);
    }

    #[tokio::test]
    async fn test_timeout_interrupts_child() {
        let runner = LocalRunner::new().with_kill_grace(Duration::from_millis(200));
        let opts = RunOptions {
            timeout: Some(Duration::from_millis(100)),
            ..RunOptions::default()
        };
        let err = runner
            .run(&args(&["sh", "-c", "echo early; sleep 30"]), &opts)
            .await
            .expect_err("must be interrupted");

        match err {
            RunnerError::Interrupted { result } => {
                assert_eq!(result.stdout, "early\n");
                assert!(result.duration < Duration::from_secs(10));
            }
            other => panic!("Expected Interrupted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_child() {
        let (tx, rx) = watch::channel(false);
        let runner = LocalRunner::new()
            .with_cancel(rx)
            .with_kill_grace(Duration::from_millis(200));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
        });

        let err = runner
            .run(&args(&["sleep", "30"]), &RunOptions::default())
            .await
            .expect_err("must be interrupted");
        assert!(matches!(err, RunnerError::Interrupted { .. }));
    }

    #[tokio::test]
    async fn test_signal_death_maps_to_negative_code() {
        let runner = LocalRunner::new();
        let opts = RunOptions {
            ignore_status: true,
            ..RunOptions::default()
        };
        let result = runner
            .run(&args(&["sh", "-c", "kill -TERM $$"]), &opts)
            .await
            .expect("signal death with ignore_status");
        assert_eq!(result.exit_status, Some(-15));
    }

    #[tokio::test]
    async fn test_run_command_splits_shell_words() {
        let result = run_command("echo 'one two'  three", false, false)
            .await
            .expect("echo should succeed");
        assert_eq!(result.stdout, "one two three\n");
    }

    #[tokio::test]
    async fn test_system_and_system_output() {
        assert_eq!(system("true", false, false).await.unwrap(), 0);
        assert_eq!(system("false", false, true).await.unwrap(), 1);
        assert_eq!(
            system_output("echo hi", false, false).await.unwrap(),
            "hi\n"
        );
    }
}
