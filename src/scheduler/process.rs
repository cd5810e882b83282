// Process execution for simulation jobs.

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of one external process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Spawns the simulation binary and waits for it to finish.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, args: &[String], workdir: &Path) -> io::Result<ProcessOutput>;
}

/// Runs the process on the host with `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct SystemLauncher;

#[async_trait]
impl ProcessLauncher for SystemLauncher {
    async fn launch(&self, args: &[String], workdir: &Path) -> io::Result<ProcessOutput> {
        let (program, rest) = args.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty command line")
        })?;

        tracing::debug!("Launching {} in {}", program, workdir.display());

        let output = Command::new(program)
            .args(rest)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
