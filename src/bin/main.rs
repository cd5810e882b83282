use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use sim_orchestrator::{
    AccountId, AppConfig, ProjectRef, RunSubmission, VersionId, create_service, load_config,
};

#[derive(Parser)]
#[command(name = "sim-orchestrator")]
#[command(about = "Versioned simulation projects and a local job scheduler")]
struct Cli {
    /// Database URL (overrides the configuration file)
    #[arg(long, global = true, env = "SIM_DB_URL")]
    db_url: Option<String>,
    /// Number of concurrent simulation workers
    #[arg(long, global = true)]
    workers: Option<usize>,
    /// Simulation binary to execute
    #[arg(long, global = true)]
    binary: Option<String>,
    /// Parent directory for job working directories
    #[arg(long, global = true)]
    work_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,
    /// Create a project with its first version
    CreateProject {
        #[arg(long)]
        account: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List the projects of an account
    ListProjects {
        #[arg(long)]
        account: String,
    },
    /// Append a new version, copied from the latest one
    CreateVersion {
        #[arg(long)]
        account: String,
        #[arg(long)]
        project: String,
        /// Copy this version instead of the latest
        #[arg(long)]
        from: Option<u32>,
    },
    /// Show the status of every version of a project
    Status {
        #[arg(long)]
        account: String,
        #[arg(long)]
        project: String,
    },
    /// Run a version and wait until the simulation finishes
    Run {
        #[arg(long)]
        account: String,
        #[arg(long)]
        project: String,
        #[arg(long)]
        version: u32,
    },
}

fn apply_overrides(cli: &Cli, mut config: AppConfig) -> AppConfig {
    if let Some(url) = &cli.db_url {
        config.database.url = url.clone();
    }
    if let Some(workers) = cli.workers {
        config.scheduler.workers = workers;
    }
    if let Some(binary) = &cli.binary {
        config.simulation.binary = binary.clone();
    }
    if let Some(root) = &cli.work_root {
        config.scheduler.work_root = Some(root.clone());
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("sim_orchestrator=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let config = apply_overrides(&cli, load_config()?);
    info!("Using database url: {}", config.database.url);

    let service = create_service(config).await?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized");
        }
        Commands::CreateProject {
            account,
            name,
            description,
        } => {
            let project = service
                .lifecycle
                .create_project(AccountId::new(account), name, description)
                .await?;
            println!("Created project {} ({})", project.id, project.name);
        }
        Commands::ListProjects { account } => {
            let projects = service
                .lifecycle
                .list_projects(&AccountId::new(account))
                .await?;
            println!("Found {} projects:", projects.len());
            for project in projects {
                println!(
                    "  {}  {}  ({} versions)",
                    project.id,
                    project.name,
                    project.versions.len()
                );
            }
        }
        Commands::CreateVersion {
            account,
            project,
            from,
        } => {
            let id = ProjectRef::new(account, project);
            let version = match from {
                Some(source) => {
                    service
                        .lifecycle
                        .create_version_from(&id.version(source))
                        .await?
                }
                None => service.lifecycle.create_version_from_latest(&id).await?,
            };
            println!("Created version {} of {}", version.id, id);
        }
        Commands::Status { account, project } => {
            let id = ProjectRef::new(account, project);
            let project = service.lifecycle.fetch_project(&id).await?;
            println!("Project: {} ({})", project.name, id);
            for version in &project.versions {
                println!(
                    "  v{}  {:<10} {}",
                    version.id,
                    version.status,
                    version.updated_at.to_rfc3339()
                );
            }
        }
        Commands::Run {
            account,
            project,
            version,
        } => {
            let id = ProjectRef::new(account, project).version(VersionId(version));
            match service.run_simulation(&id).await? {
                RunSubmission::Queued(job_id) => {
                    println!("Submitted job {} for {}", job_id, id);
                    // Drains the queue and waits for the worker to finish.
                    service.shutdown().await;
                }
                RunSubmission::Failed => {
                    println!("Setup of {} could not be converted", id);
                }
            }

            let status = service.lifecycle.fetch_version_status(&id).await?;
            println!("Simulation finished with status: {}", status);
        }
    }

    Ok(())
}
