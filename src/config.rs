use std::path::PathBuf;
use std::time::Duration;

/// Which captured streams get recorded as reference files next to each test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputCheckMode {
    All,
    Stdout,
    Stderr,
    #[default]
    None,
}

/// Resolved job configuration, handed over by the CLI layer. The engine
/// never parses arguments; it only consumes the values collected here.
#[derive(Clone, Debug, Default)]
pub struct JobConfig {
    /// Caller-supplied job identifier. Must be 40 hex digits when present;
    /// a fresh identifier is generated when absent.
    pub job_id: Option<String>,
    /// Ordered list of resolved test command lines.
    pub tests: Vec<String>,
    /// Hand the sealed work directory to the external archiver.
    pub archive: bool,
    /// Keep the job work directory after sealing.
    pub keep_tmp_files: bool,
    pub output_check_record: OutputCheckMode,
    /// Multiplex filter paths. Opaque to the engine, forwarded to the
    /// external test-list resolution step.
    pub filter_only: Vec<PathBuf>,
    pub filter_out: Vec<PathBuf>,
    /// Wall-clock budget per test. No limit when unset.
    pub test_timeout: Option<Duration>,
}
