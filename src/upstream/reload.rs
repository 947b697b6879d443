//! Proxy reload command.

use std::process::ExitStatus;

use thiserror::Error;
use tokio::process::Command;

use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("reload command is empty")]
    Empty,

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("reload command exited with {status}, output: {output}")]
    Failed { status: ExitStatus, output: String },
}

/// A whitespace-split command line: first token is the executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadCommand {
    program: String,
    args: Vec<String>,
}

impl ReloadCommand {
    pub fn parse(command: &str) -> Result<Self, ReloadError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(ReloadError::Empty)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run to completion and return the combined stdout/stderr.
    ///
    /// There is no timeout: a hung reload stalls only the calling task.
    pub async fn run(&self) -> Result<String, ReloadError> {
        tracing::debug!(program = %self.program, args = ?self.args, "Running reload command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|source| {
                metrics::record_proxy_reload(false);
                ReloadError::Spawn {
                    program: self.program.clone(),
                    source,
                }
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim().to_string();

        metrics::record_proxy_reload(output.status.success());
        if output.status.success() {
            Ok(combined)
        } else {
            Err(ReloadError::Failed {
                status: output.status,
                output: combined,
            })
        }
    }
}
