pub mod monitor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::{JobConfig, OutputCheckMode};
use crate::debug::DebugConfig;
use crate::domain::{
    CommandResult, EXIT_ERRORED, EXIT_FAILED, EXIT_INTERRUPTED, EXIT_PASSED, EXIT_VALIDATION,
    JobId, JobResult, JobStatus, TestResult, TestStatus, ValidationError,
};
use crate::job::monitor::JobMonitor;
use crate::runner::traits::{ProcessRunner, RunOptions, RunnerError};
use crate::runner::words;

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to set up job work dir {path}: {message}")]
    WorkDir { path: PathBuf, message: String },
}

impl JobError {
    pub fn exit_code(&self) -> i32 {
        match self {
            JobError::Validation(_) => EXIT_VALIDATION,
            JobError::WorkDir { .. } => EXIT_ERRORED,
        }
    }
}

/// Owns the end-to-end execution of one job: validates inputs, runs each
/// test through the process runner (wrapped by the debug config), and
/// aggregates the outcomes. An engine instance runs exactly one job.
#[derive(Debug)]
pub struct JobEngine {
    config: JobConfig,
    debug: DebugConfig,
    runner: Arc<dyn ProcessRunner>,
    monitor: Arc<dyn JobMonitor>,
    cancel: Option<watch::Receiver<bool>>,
}

impl JobEngine {
    pub fn new(
        config: JobConfig,
        debug: DebugConfig,
        runner: Arc<dyn ProcessRunner>,
        monitor: Arc<dyn JobMonitor>,
    ) -> Self {
        Self {
            config,
            debug,
            runner,
            monitor,
            cancel: None,
        }
    }

    /// Observe an external interrupt. A raised signal stops intake of
    /// further tests; the in-flight test is terminated and recorded as
    /// interrupted.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run the job to completion and seal the result.
    ///
    /// Job-fatal errors (malformed job id, unusable work dir) surface
    /// here before any test executes. Per-test failures never do; they
    /// are classified into the result and the job continues.
    pub async fn run(self) -> Result<JobResult, JobError> {
        let job_id = match &self.config.job_id {
            Some(raw) => JobId::parse(raw)?,
            None => JobId::generate(),
        };
        let started_at = chrono::Utc::now();
        let work_dir = std::env::temp_dir().join(format!("testrun_{}", job_id));

        if !self.config.filter_only.is_empty() || !self.config.filter_out.is_empty() {
            // opaque to the engine; the external test-list resolution
            // already consumed these
            tracing::debug!(
                "Multiplex filters: only={:?} out={:?}",
                self.config.filter_only,
                self.config.filter_out
            );
        }

        // the work dir must exist before the start event fires; its
        // subscribers snapshot state into it
        std::fs::create_dir_all(&work_dir).map_err(|e| JobError::WorkDir {
            path: work_dir.clone(),
            message: e.to_string(),
        })?;
        self.monitor.on_job_start(&job_id, &work_dir).await;

        let mut tests = Vec::with_capacity(self.config.tests.len());
        let mut interrupted = false;

        if self.config.tests.is_empty() {
            tracing::info!("Job {}: nothing to run", job_id.short());
        }
        for (index, test_id) in self.config.tests.iter().enumerate() {
            if self.cancelled() {
                tracing::warn!("Job {}: interrupted, halting test intake", job_id.short());
                interrupted = true;
                break;
            }

            let test = self.run_one(index, test_id, &work_dir).await;
            let stop = test.status == TestStatus::Interrupted;
            tests.push(test);
            if stop {
                interrupted = true;
                break;
            }
        }

        let (status, exit_code) = if self.config.tests.is_empty() {
            (JobStatus::Empty, EXIT_PASSED)
        } else {
            seal(&tests, interrupted)
        };

        let keep_dir = self.config.keep_tmp_files || self.config.archive;
        if !keep_dir {
            if let Err(e) = std::fs::remove_dir_all(&work_dir) {
                tracing::warn!("Failed to remove work dir {}: {}", work_dir.display(), e);
            }
        }

        let result = JobResult {
            job_id,
            started_at,
            finished_at: chrono::Utc::now(),
            tests,
            status,
            exit_code,
            work_dir: keep_dir.then_some(work_dir),
        };
        self.monitor.on_job_end(&result).await;
        Ok(result)
    }

    /// Execute a single test and classify its outcome. Infrastructure
    /// failures become `Errored` results, never job-fatal errors.
    async fn run_one(&self, index: usize, test_id: &str, work_dir: &Path) -> TestResult {
        let test_dir = work_dir.join(format!("test_{:02}_{}", index + 1, sanitize(test_id)));
        if let Err(e) = std::fs::create_dir_all(&test_dir) {
            return errored(index, test_id, format!("cannot create test dir: {}", e));
        }

        let args = match words::split(test_id) {
            Ok(args) if !args.is_empty() => args,
            Ok(_) => return errored(index, test_id, "empty test command".to_string()),
            Err(e) => return errored(index, test_id, e.to_string()),
        };

        let wrapped = self.debug.wrap(&args);
        let under_debugger = wrapped.len() != args.len();
        let opts = RunOptions {
            verbose: true,
            ignore_status: false,
            timeout: self.config.test_timeout,
            cwd: Some(test_dir.clone()),
        };

        let (status, command, failure) = match self.runner.run(&wrapped, &opts).await {
            Ok(result) => (TestStatus::Passed, Some(result), None),
            Err(RunnerError::CommandFailed { result }) => {
                (TestStatus::Failed, Some(result), None)
            }
            Err(RunnerError::Interrupted { result }) => {
                (TestStatus::Interrupted, Some(result), None)
            }
            Err(e @ (RunnerError::NotFound { .. } | RunnerError::Spawn { .. })) => {
                (TestStatus::Errored, None, Some(e.to_string()))
            }
        };
        tracing::info!("Test {:02} '{}': {:?}", index + 1, test_id, status);

        if let Some(result) = &command {
            self.record_output(result, &test_dir);
        }
        let core_dump = (under_debugger && self.debug.core_dump_enabled())
            .then(|| find_core_dump(&test_dir))
            .flatten();

        TestResult {
            index,
            id: test_id.to_string(),
            status,
            command,
            failure,
            core_dump,
        }
    }

    /// Record captured streams as reference files next to the test.
    fn record_output(&self, result: &CommandResult, test_dir: &Path) {
        let mode = self.config.output_check_record;
        let record = |name: &str, data: &str| {
            if let Err(e) = std::fs::write(test_dir.join(name), data) {
                tracing::warn!("Failed to record {}: {}", name, e);
            }
        };
        if matches!(mode, OutputCheckMode::All | OutputCheckMode::Stdout) {
            record("stdout.expected", &result.stdout);
        }
        if matches!(mode, OutputCheckMode::All | OutputCheckMode::Stderr) {
            record("stderr.expected", &result.stderr);
        }
    }
}

fn errored(index: usize, test_id: &str, failure: String) -> TestResult {
    TestResult {
        index,
        id: test_id.to_string(),
        status: TestStatus::Errored,
        command: None,
        failure: Some(failure),
        core_dump: None,
    }
}

/// Worst-status-wins reduction into the job status and exit code.
fn seal(tests: &[TestResult], interrupted: bool) -> (JobStatus, i32) {
    // the no-results case is only reachable when the job was cancelled
    // before its first test started
    let mut worst = tests
        .iter()
        .map(|t| t.status)
        .max_by_key(|s| s.severity())
        .unwrap_or(TestStatus::Interrupted);
    if interrupted && worst.severity() < TestStatus::Interrupted.severity() {
        worst = TestStatus::Interrupted;
    }

    match worst {
        TestStatus::Failed => (JobStatus::Failed, EXIT_FAILED),
        TestStatus::Errored => (JobStatus::Errored, EXIT_ERRORED),
        TestStatus::Interrupted => (JobStatus::Interrupted, EXIT_INTERRUPTED),
        TestStatus::Passed => (JobStatus::Passed, EXIT_PASSED),
    }
}

/// gdb drops core files named `core` or `core.<pid>` into the working
/// directory. Anything else merely sharing the prefix is not a core.
fn find_core_dump(test_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(test_dir).ok()?;
    entries.flatten().map(|e| e.path()).find(|p| {
        p.file_name()
            .map(|n| {
                let name = n.to_string_lossy();
                name == "core" || name.starts_with("core.")
            })
            .unwrap_or(false)
    })
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(40)
        .collect()
}
