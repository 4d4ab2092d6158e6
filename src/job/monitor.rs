use std::path::Path;

use crate::domain::{JobId, JobResult};

/// Lifecycle seam for job-level collaborators.
///
/// The system-information collector subscribes here to snapshot host
/// state around a job; the engine itself only emits the events.
#[mockall::automock]
#[async_trait::async_trait]
pub trait JobMonitor: std::fmt::Debug + Send + Sync {
    async fn on_job_start(&self, job_id: &JobId, work_dir: &Path);
    async fn on_job_end(&self, result: &JobResult);
}

/// Default monitor: logs the lifecycle through `tracing`.
#[derive(Clone, Debug, Default)]
pub struct LoggingMonitor;

#[async_trait::async_trait]
impl JobMonitor for LoggingMonitor {
    async fn on_job_start(&self, job_id: &JobId, work_dir: &Path) {
        tracing::info!("Job {} started, work dir {}", job_id, work_dir.display());
    }

    async fn on_job_end(&self, result: &JobResult) {
        tracing::info!(
            "Job {} finished: {:?}, {} test(s), exit code {}",
            result.job_id,
            result.status,
            result.tests.len(),
            result.exit_code
        );
    }
}
