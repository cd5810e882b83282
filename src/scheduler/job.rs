use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::model::VersionStatus;

/// Input or output files of a run, keyed by file name.
pub type FileSet = BTreeMap<String, String>;

/// Builds the process argument list for a given working directory.
pub type CommandFn = Box<dyn Fn(&Path) -> Vec<String> + Send + Sync>;

/// Receives the progress and the final outcome of one job.
///
/// `complete` is invoked exactly once per job, on the worker's task. A job
/// that could not get a working directory skips `status_update` and goes
/// straight to `complete` with an error set.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn status_update(&self, status: VersionStatus);

    async fn complete(&self, outcome: JobOutcome);
}

/// Everything the outside world learns about a finished job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOutcome {
    pub job_id: Uuid,
    /// Files the process left in its working directory (inputs excluded).
    pub files: FileSet,
    pub stdout: String,
    pub stderr: String,
    /// Per-artifact errors; empty on a clean run.
    pub errors: BTreeMap<String, String>,
}

impl JobOutcome {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            ..Default::default()
        }
    }

    pub fn failed(job_id: Uuid, artifact: impl Into<String>, message: impl Into<String>) -> Self {
        let mut outcome = Self::new(job_id);
        outcome.errors.insert(artifact.into(), message.into());
        outcome
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A unit of scheduling work: input files, a command builder and a sink.
pub struct SimulationJob {
    pub id: Uuid,
    pub files: FileSet,
    command: CommandFn,
    sink: Arc<dyn JobSink>,
}

impl SimulationJob {
    pub fn new(
        files: FileSet,
        command: impl Fn(&Path) -> Vec<String> + Send + Sync + 'static,
        sink: Arc<dyn JobSink>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            files,
            command: Box::new(command),
            sink,
        }
    }

    pub fn command_for(&self, workdir: &Path) -> Vec<String> {
        (self.command)(workdir)
    }

    pub fn sink(&self) -> &Arc<dyn JobSink> {
        &self.sink
    }

    /// Report a job that never reached a worker.
    pub(crate) async fn reject(self, reason: impl fmt::Display) {
        let outcome = JobOutcome::failed(self.id, "worker", reason.to_string());
        self.sink.complete(outcome).await;
    }
}

impl fmt::Debug for SimulationJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationJob")
            .field("id", &self.id)
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
