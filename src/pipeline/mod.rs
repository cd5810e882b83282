//! Result pipeline: convert a version's setup, run it through the scheduler,
//! parse what comes back and record the outcome on the version.
//!
//! Conversion, execution and parse failures never reach the caller; they end
//! as a `Failure` status on the version.

pub mod command;
pub mod convert;
pub mod parse;

pub use command::CommandTemplate;
pub use convert::{Conversion, JsonSetupConverter, ModelConverter, SimulationContext};
pub use parse::{FileSetParser, ResultParser};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::lifecycle::VersionLifecycle;
use crate::model::{ComputingLibrary, Settings, SimulationEngine, VersionStatus};
use crate::scheduler::{FileSet, JobOutcome, JobScheduler, JobSink, SimulationJob};
use crate::types::{ArtifactRef, VersionRef};

/// What the caller of [`SimulationProcessor::run_simulation`] learns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSubmission {
    /// The job was accepted by the scheduler.
    Queued(Uuid),
    /// The setup could not be converted. The version is already marked
    /// `Failure` and no job was started.
    Failed,
}

impl RunSubmission {
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            Self::Queued(id) => Some(*id),
            Self::Failed => None,
        }
    }
}

pub struct SimulationProcessor {
    lifecycle: Arc<VersionLifecycle>,
    scheduler: Arc<JobScheduler>,
    converter: Arc<dyn ModelConverter>,
    parser: Arc<dyn ResultParser>,
    command: CommandTemplate,
}

fn ensure_supported(settings: &Settings) -> CoreResult<()> {
    match (settings.simulation_engine, settings.computing_library) {
        (SimulationEngine::Local, ComputingLibrary::Shield) => Ok(()),
        (engine, library) => Err(CoreError::Validation(format!(
            "simulation engine {:?} with library {:?} is not supported",
            engine, library
        ))),
    }
}

impl SimulationProcessor {
    pub fn new(
        lifecycle: Arc<VersionLifecycle>,
        scheduler: Arc<JobScheduler>,
        converter: Arc<dyn ModelConverter>,
        parser: Arc<dyn ResultParser>,
        command: CommandTemplate,
    ) -> Self {
        Self {
            lifecycle,
            scheduler,
            converter,
            parser,
            command,
        }
    }

    /// Queue a run of `id`.
    ///
    /// Returns once the job is accepted by the scheduler; the status moves to
    /// `Running` and then `Success`/`Failure` asynchronously. Errors are
    /// limited to lookup, runnability, settings and scheduling failures.
    pub async fn run_simulation(&self, id: &VersionRef) -> CoreResult<RunSubmission> {
        let version = self.lifecycle.fetch_version(id).await?;
        if !version.status.is_runnable() {
            return Err(CoreError::NotRunnable(version.status));
        }
        ensure_supported(&version.settings)?;

        let setup = self.lifecycle.store().fetch_setup(&version.setup_id).await?;

        let conversion = match self.converter.convert(&setup) {
            Ok(conversion) => conversion,
            Err(e) => {
                warn!("Model conversion failed for {}: {}", id, e);
                if let Err(status_err) = self
                    .lifecycle
                    .set_version_status(id, VersionStatus::Failure)
                    .await
                {
                    error!("Unable to mark {} as failed: {}", id, status_err);
                }
                return Ok(RunSubmission::Failed);
            }
        };

        let sink = Arc::new(VersionRunSink {
            lifecycle: self.lifecycle.clone(),
            parser: self.parser.clone(),
            version: id.clone(),
            result_id: version.result_id.clone(),
            context: conversion.context,
        });

        let command = self.command.clone();
        let job = SimulationJob::new(conversion.files, move |dir| command.build(dir), sink);

        match self.scheduler.submit(job) {
            Ok(job_id) => {
                info!("Simulation of {} queued as job {}", id, job_id);
                Ok(RunSubmission::Queued(job_id))
            }
            Err(e) => {
                warn!("Failed to schedule simulation of {}: {}", id, e);
                Err(e)
            }
        }
    }
}

/// Callbacks of one run; writes status and results back to the version.
struct VersionRunSink {
    lifecycle: Arc<VersionLifecycle>,
    parser: Arc<dyn ResultParser>,
    version: VersionRef,
    result_id: ArtifactRef,
    context: SimulationContext,
}

impl VersionRunSink {
    async fn mark(&self, status: VersionStatus) {
        if let Err(e) = self.lifecycle.set_version_status(&self.version, status).await {
            error!("Unable to set status of {} to {}: {}", self.version, status, e);
        }
    }

    async fn parse_results(&self, files: &FileSet) {
        let parsed = match self.parser.parse(files, &self.context) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Error parsing results of {}: {}", self.version, e);
                self.mark(VersionStatus::Failure).await;
                return;
            }
        };

        if let Err(e) = self
            .lifecycle
            .store()
            .update_result(&self.result_id, &parsed)
            .await
        {
            error!("Unable to store results of {}: {}", self.version, e);
            self.mark(VersionStatus::Failure).await;
            return;
        }

        self.mark(VersionStatus::Success).await;
        debug!("Stored results of {}", self.version);
    }
}

#[async_trait]
impl JobSink for VersionRunSink {
    async fn status_update(&self, status: VersionStatus) {
        self.mark(status).await;
    }

    async fn complete(&self, outcome: JobOutcome) {
        if !outcome.is_success() {
            warn!(
                "Simulation of {} failed: {:?}",
                self.version, outcome.errors
            );
            self.mark(VersionStatus::Failure).await;
            return;
        }
        self.parse_results(&outcome.files).await;
    }
}
