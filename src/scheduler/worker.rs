//! Execution worker: runs one job inside its own temporary directory.

use std::io;
use std::path::{Component, Path};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use crate::model::VersionStatus;
use crate::scheduler::job::{FileSet, JobOutcome, SimulationJob};
use crate::scheduler::process::ProcessLauncher;

pub(crate) struct ExecutionWorker {
    job: SimulationJob,
    workdir: TempDir,
}

/// A claimed pool slot: the semaphore permit plus one unit of the
/// running-worker count.
///
/// The count is released before the permit, so whoever acquires the permit
/// next already sees the slot as free.
pub(crate) struct WorkerSlot {
    running: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl WorkerSlot {
    pub(crate) fn occupy(permit: OwnedSemaphorePermit, running: Arc<AtomicUsize>) -> Self {
        running.fetch_add(1, Ordering::SeqCst);
        Self {
            running,
            _permit: permit,
        }
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

async fn materialize(dir: &Path, files: &FileSet) -> io::Result<()> {
    for (name, contents) in files {
        if !is_plain_file_name(name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("input file name `{}` is not a plain file name", name),
            ));
        }
        tokio::fs::write(dir.join(name), contents).await?;
    }
    Ok(())
}

async fn collect_outputs(dir: &Path, inputs: &FileSet, outcome: &mut JobOutcome) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            outcome.errors.insert("output".to_string(), e.to_string());
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                outcome.errors.insert("output".to_string(), e.to_string());
                break;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if inputs.contains_key(&name) {
            continue;
        }
        match entry.file_type().await {
            Ok(kind) if kind.is_file() => {}
            _ => continue,
        }

        match tokio::fs::read(entry.path()).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => {
                    outcome.files.insert(name, text);
                }
                Err(_) => {
                    outcome
                        .errors
                        .insert(format!("output:{}", name), "not valid UTF-8".to_string());
                }
            },
            Err(e) => {
                outcome.errors.insert(format!("output:{}", name), e.to_string());
            }
        }
    }
}

impl ExecutionWorker {
    /// Allocate a fresh working directory and write the job's inputs into it.
    ///
    /// On failure the job is handed back so the caller can still report it.
    pub(crate) async fn prepare(
        job: SimulationJob,
        work_root: Option<&Path>,
    ) -> Result<Self, (SimulationJob, io::Error)> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sim-job-");
        let created = match work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };

        let workdir = match created {
            Ok(dir) => dir,
            Err(e) => return Err((job, e)),
        };

        if let Err(e) = materialize(workdir.path(), &job.files).await {
            return Err((job, e));
        }

        Ok(Self { job, workdir })
    }

    /// Run the job to completion and report through its sink.
    ///
    /// The slot is held for the whole run and released when this future
    /// finishes or unwinds.
    pub(crate) async fn run(self, launcher: Arc<dyn ProcessLauncher>, slot: WorkerSlot) {
        let _slot = slot;
        let Self { job, workdir } = self;
        let sink = job.sink().clone();

        sink.status_update(VersionStatus::Running).await;

        let args = job.command_for(workdir.path());
        debug!("Job {} starting: {:?}", job.id, args);

        let mut outcome = JobOutcome::new(job.id);
        match launcher.launch(&args, workdir.path()).await {
            Ok(output) => {
                if !output.success() {
                    let reason = match output.exit_code {
                        Some(code) => format!("process exited with status {}", code),
                        None => "process terminated by signal".to_string(),
                    };
                    outcome.errors.insert("exit".to_string(), reason);
                }
                outcome.stdout = output.stdout;
                outcome.stderr = output.stderr;
                collect_outputs(workdir.path(), &job.files, &mut outcome).await;
            }
            Err(e) => {
                warn!("Job {} failed to start process: {}", job.id, e);
                outcome.errors.insert("process".to_string(), e.to_string());
            }
        }

        debug!(
            "Job {} finished: {} output files, {} errors",
            job.id,
            outcome.files.len(),
            outcome.errors.len()
        );
        sink.complete(outcome).await;

        if let Err(e) = workdir.close() {
            warn!("Failed to remove working directory of job {}: {}", job.id, e);
        }
    }
}
