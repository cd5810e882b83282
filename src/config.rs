use serde::Deserialize;
use std::{env, fs, path::PathBuf};

use crate::db::DatabaseConfig;
use crate::error::{CoreError, CoreResult};

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Top-level configuration file (`sim-orchestrator.json`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Number of simulations allowed to execute at the same time.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum number of accepted jobs waiting for a worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Parent directory for per-job working directories (system temp if unset).
    #[serde(default)]
    pub work_root: Option<PathBuf>,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            work_root: None,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.workers == 0 {
            return Err(CoreError::Validation(
                "scheduler.workers must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(CoreError::Validation(
                "scheduler.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the external simulation binary is invoked.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Argument template; `{workdir}` is replaced by the job's working directory.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

fn default_binary() -> String {
    "shieldhit".to_string()
}

fn default_args() -> Vec<String> {
    vec!["{workdir}".to_string()]
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            args: default_args(),
        }
    }
}

/// Locate the configuration file, if any.
///
/// `SIM_ORCHESTRATOR_CONFIG` wins, then `$XDG_CONFIG_HOME/sim-orchestrator/config.json`,
/// then `./sim-orchestrator.json`.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("SIM_ORCHESTRATOR_CONFIG") {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg)
            .join("sim-orchestrator")
            .join("config.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("sim-orchestrator.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_config(cfg: AppConfig) -> AppConfig {
    let mut cfg = cfg;

    cfg.database.url = expand_env_vars(&cfg.database.url);
    cfg.database.namespace = expand_env_vars(&cfg.database.namespace);
    cfg.database.database = expand_env_vars(&cfg.database.database);
    if let Some(user) = cfg.database.username.as_mut() {
        *user = expand_env_vars(user);
    }
    if let Some(pass) = cfg.database.password.as_mut() {
        *pass = expand_env_vars(pass);
    }
    if let Some(root) = cfg.scheduler.work_root.take() {
        cfg.scheduler.work_root = Some(PathBuf::from(expand_env_vars(&root.to_string_lossy())));
    }
    cfg.simulation.binary = expand_env_vars(&cfg.simulation.binary);
    cfg.simulation.args = cfg
        .simulation
        .args
        .into_iter()
        .map(|a| expand_env_vars(&a))
        .collect();

    cfg
}

/// Parse a configuration document and expand `${VAR}` references.
pub fn parse_config(raw: &str) -> anyhow::Result<AppConfig> {
    let cfg: AppConfig = serde_json::from_str(raw)?;
    let cfg = expand_config(cfg);
    cfg.scheduler.validate()?;
    Ok(cfg)
}

/// Load the configuration file, falling back to defaults when none exists.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let Some(path) = resolve_config_path() else {
        tracing::debug!("No configuration file found, using defaults");
        return Ok(AppConfig::default());
    };

    tracing::info!("Loading configuration from {}", path.display());
    let raw = fs::read_to_string(&path)?;
    parse_config(&raw)
}
