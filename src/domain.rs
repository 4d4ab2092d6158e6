use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

/// Outcome of one subprocess invocation.
///
/// `exit_status` is set exactly once, after both output streams have been
/// fully drained. A result is never published with half-read pipes.
#[derive(Clone, Debug, Default)]
pub struct CommandResult {
    pub command: String,
    pub args: Vec<String>,
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandResult {
    pub fn new(args: &[String]) -> Self {
        Self {
            command: args.join(" "),
            args: args.to_vec(),
            ..Self::default()
        }
    }
}

impl std::fmt::Display for CommandResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Command: {}\nExit status: {:?}\nDuration: {:.3}s\nStdout:\n{}\nStderr:\n{}",
            self.command,
            self.exit_status,
            self.duration.as_secs_f64(),
            self.stdout,
            self.stderr
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    Failed,
    Errored,
    Interrupted,
}

impl TestStatus {
    /// Rank for the worst-status-wins reduction. Failed outranks Errored,
    /// Errored outranks Interrupted, Passed ranks last.
    pub fn severity(self) -> u8 {
        match self {
            TestStatus::Failed => 3,
            TestStatus::Errored => 2,
            TestStatus::Interrupted => 1,
            TestStatus::Passed => 0,
        }
    }
}

/// One executed test: the command outcome plus test-level metadata.
/// Finalized once by the engine and immutable afterwards.
#[derive(Clone, Debug)]
pub struct TestResult {
    pub index: usize,
    pub id: String,
    pub status: TestStatus,
    pub command: Option<CommandResult>,
    pub failure: Option<String>,
    pub core_dump: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Passed,
    Failed,
    Errored,
    Interrupted,
    /// The job had nothing to run. Distinct from a failure.
    Empty,
}

pub const EXIT_PASSED: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERRORED: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 3;
pub const EXIT_VALIDATION: i32 = 125;

/// Ordered record of one job. Test results appear in submission order.
#[derive(Clone, Debug)]
pub struct JobResult {
    pub job_id: JobId,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub tests: Vec<TestResult>,
    pub status: JobStatus,
    pub exit_code: i32,
    /// Work directory of the job, present when it was kept on disk for
    /// archiving or inspection.
    pub work_dir: Option<PathBuf>,
}

impl JobResult {
    pub fn count(&self, status: TestStatus) -> usize {
        self.tests.iter().filter(|t| t.status == status).count()
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("job id must be a 40 digit hex number, got {0:?}")]
    MalformedJobId(String),
}

/// Job identifier: 40 hexadecimal characters, content-hash shaped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobId(String);

impl JobId {
    /// Validate a caller-supplied identifier. Anything other than exactly
    /// 40 hex characters is rejected, before any test runs.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.len() == 40 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(raw.to_ascii_lowercase()))
        } else {
            Err(ValidationError::MalformedJobId(raw.to_string()))
        }
    }

    pub fn generate() -> Self {
        let a = Uuid::new_v4().simple().to_string();
        let b = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", a, &b[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used in directory names and log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_accepts_40_hex_chars() {
        let id = "a".repeat(40);
        assert_eq!(JobId::parse(&id).unwrap().as_str(), id);
    }

    #[test]
    fn test_job_id_normalizes_case() {
        let id = JobId::parse(&"AB".repeat(20)).unwrap();
        assert_eq!(id.as_str(), "ab".repeat(20));
    }

    #[test]
    fn test_job_id_rejects_wrong_length() {
        assert!(JobId::parse(&"a".repeat(39)).is_err());
        assert!(JobId::parse(&"a".repeat(41)).is_err());
        assert!(JobId::parse("").is_err());
    }

    #[test]
    fn test_job_id_rejects_non_hex() {
        let id = format!("{}g", "a".repeat(39));
        assert_eq!(
            JobId::parse(&id),
            Err(ValidationError::MalformedJobId(id.clone()))
        );
    }

    #[test]
    fn test_generated_job_id_is_valid() {
        let id = JobId::generate();
        assert!(JobId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn test_status_severity_ordering() {
        assert!(TestStatus::Failed.severity() > TestStatus::Errored.severity());
        assert!(TestStatus::Errored.severity() > TestStatus::Interrupted.severity());
        assert!(TestStatus::Interrupted.severity() > TestStatus::Passed.severity());
    }
}
