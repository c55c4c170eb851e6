use crate::error::{BookSplitterError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// What a missing tool means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Missing tool aborts the command.
    Hard,
    /// Missing tool is logged and the dependent check is skipped.
    Soft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRun {
    pub success: bool,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// An external program found through `PATH`.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    name: String,
}

impl ExternalTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `<tool> --version`; `None` when the tool cannot be executed.
    pub async fn probe(&self) -> Option<String> {
        let run = self
            .run(&["--version"], None, Duration::from_secs(10))
            .await
            .ok()?;
        if run.success {
            let version = run.stdout.trim().to_string();
            debug!("Found {}: {}", self.name, version);
            Some(version)
        } else {
            None
        }
    }

    /// Applies the availability policy. `Ok(None)` means "skip".
    pub async fn ensure(&self, requirement: Requirement) -> Result<Option<String>> {
        match (self.probe().await, requirement) {
            (Some(version), _) => {
                info!("Using {}", version);
                Ok(Some(version))
            }
            (None, Requirement::Hard) => Err(BookSplitterError::ToolMissing {
                tool: self.name.clone(),
            }),
            (None, Requirement::Soft) => {
                warn!("{} not found on PATH; dependent checks are skipped", self.name);
                Ok(None)
            }
        }
    }

    /// Runs the tool and waits at most `timeout`. A timeout is reported in
    /// the returned `ToolRun`, not as an error; failing to spawn is an error.
    pub async fn run(&self, args: &[&str], cwd: Option<&Path>, timeout: Duration) -> Result<ToolRun> {
        let mut command = Command::new(&self.name);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        debug!("Running {} {}", self.name, args.join(" "));
        let child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BookSplitterError::ToolMissing {
                tool: self.name.clone(),
            },
            _ => BookSplitterError::ToolFailed {
                tool: self.name.clone(),
                reason: e.to_string(),
            },
        })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                Ok(ToolRun {
                    success: output.status.success(),
                    timed_out: false,
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Err(_) => {
                warn!(
                    "{} {} timed out after {}s",
                    self.name,
                    args.join(" "),
                    timeout.as_secs()
                );
                Ok(ToolRun {
                    success: false,
                    timed_out: true,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        }
    }
}
