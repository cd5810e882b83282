use std::path::Path;

use crate::config::SimulationConfig;

const WORKDIR_PLACEHOLDER: &str = "{workdir}";

/// Argument list for the simulation binary with a `{workdir}` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    pub binary: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(binary: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
        }
    }

    pub fn build(&self, workdir: &Path) -> Vec<String> {
        let dir = workdir.display().to_string();
        std::iter::once(self.binary.clone())
            .chain(self.args.iter().map(|a| a.replace(WORKDIR_PLACEHOLDER, &dir)))
            .collect()
    }
}

impl From<&SimulationConfig> for CommandTemplate {
    fn from(config: &SimulationConfig) -> Self {
        Self::new(config.binary.clone(), config.args.clone())
    }
}
