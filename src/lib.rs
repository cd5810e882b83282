// Core modules
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod types;

// Version lifecycle, job scheduling and the result pipeline on top of them
pub mod lifecycle;
pub mod pipeline;
pub mod scheduler;

// Re-export key types and functions
pub use config::{AppConfig, SchedulerConfig, SimulationConfig, load_config};
pub use db::{DatabaseConfig, ProjectStore, SurrealStore, create_connection, ensure_schema};
pub use error::{CoreError, CoreResult};
pub use lifecycle::VersionLifecycle;
pub use model::{Project, Settings, Setup, SimulationResult, Version, VersionStatus};
pub use pipeline::{CommandTemplate, RunSubmission, SimulationProcessor};
pub use scheduler::JobScheduler;
pub use types::{AccountId, ArtifactRef, ProjectId, ProjectRef, VersionId, VersionRef};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use pipeline::{FileSetParser, JsonSetupConverter};
use scheduler::SystemLauncher;

/// The wired-up application: lifecycle engine, scheduler and result pipeline
/// sharing one store.
pub struct SimulationService {
    pub lifecycle: Arc<VersionLifecycle>,
    pub scheduler: Arc<JobScheduler>,
    pub processor: SimulationProcessor,
}

impl SimulationService {
    pub async fn run_simulation(&self, id: &VersionRef) -> CoreResult<RunSubmission> {
        self.processor.run_simulation(id).await
    }

    /// Stop taking jobs and wait for the ones already accepted.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

/// Convenience function to create a fully configured service.
///
/// Connects to the database, makes sure the schema exists and starts the job
/// scheduler with the system process launcher.
pub async fn create_service(config: AppConfig) -> Result<Arc<SimulationService>> {
    info!("Connecting to database at {}", config.database.url);
    let db = create_connection(config.database.clone()).await?;
    ensure_schema(&db).await?;

    let store: Arc<dyn ProjectStore> = Arc::new(SurrealStore::new(db));
    let lifecycle = Arc::new(VersionLifecycle::new(store));

    let scheduler = Arc::new(JobScheduler::start(
        &config.scheduler,
        Arc::new(SystemLauncher),
    )?);

    let processor = SimulationProcessor::new(
        lifecycle.clone(),
        scheduler.clone(),
        Arc::new(JsonSetupConverter),
        Arc::new(FileSetParser),
        CommandTemplate::from(&config.simulation),
    );

    Ok(Arc::new(SimulationService {
        lifecycle,
        scheduler,
        processor,
    }))
}
