//! Invocation of the external `gifsicle` binary.
//!
//! The binary is checked once at startup with `gifsicle --version`; the outcome is kept for
//! the lifetime of the process and every call consults it instead of re-probing.

use super::{OptimizationSettings, PipelineError};
use crate::config::OptimizerConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// How long the startup version check may take before gifsicle is treated as missing.
const DETECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizerStatus {
    Available { version: String },
    Unavailable,
}

/// A configured gifsicle binary together with its detected availability.
#[derive(Debug, Clone)]
pub struct Gifsicle {
    binary: PathBuf,
    optimization_level: u8,
    timeout: Duration,
    status: OptimizerStatus,
}

impl Gifsicle {
    /// Run the configured binary once and remember whether it can be run.
    #[instrument(skip_all, fields(binary = %config.binary.display()))]
    pub async fn detect(config: &OptimizerConfig) -> Self {
        let status = query_version(&config.binary).await;
        match &status {
            OptimizerStatus::Available { version } => info!(version = %version, "gifsicle detected"),
            OptimizerStatus::Unavailable => warn!("gifsicle is not available; every optimization request will fail"),
        }
        Self::with_status(config, status)
    }

    /// Build without probing. Used when availability is already known, e.g. in tests.
    pub fn with_status(config: &OptimizerConfig, status: OptimizerStatus) -> Self {
        Self {
            binary: config.binary.clone(),
            optimization_level: config.optimization_level,
            timeout: config.timeout,
            status,
        }
    }

    pub fn status(&self) -> &OptimizerStatus {
        &self.status
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, OptimizerStatus::Available { .. })
    }

    /// `-O<level> --lossy=<n> --colors <n> <input> -o <output>`
    fn arguments(&self, settings: OptimizationSettings, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            format!("-O{}", self.optimization_level).into(),
            format!("--lossy={}", settings.lossy()).into(),
            "--colors".into(),
            settings.colors().to_string().into(),
            input.into(),
            "-o".into(),
            output.into(),
        ]
    }

    /// Run gifsicle on `input`, writing to `output`.
    ///
    /// The child is killed if it outlives the configured timeout.
    pub async fn optimize(&self, settings: OptimizationSettings, input: &Path, output: &Path) -> Result<(), PipelineError> {
        if !self.is_available() {
            return Err(PipelineError::Unavailable);
        }

        let child = Command::new(&self.binary)
            .args(self.arguments(settings, input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let result = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout = ?self.timeout, "gifsicle timed out and was killed");
                return Err(PipelineError::Timeout { timeout: self.timeout });
            }
        };

        if !result.status.success() {
            let diagnostics = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(PipelineError::optimizer_failed(result.status.code(), diagnostics));
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(PipelineError::OutputMissing);
        }

        debug!(exit_code = ?result.status.code(), "gifsicle finished");
        Ok(())
    }
}

async fn query_version(binary: &Path) -> OptimizerStatus {
    let mut command = Command::new(binary);
    command.arg("--version").stdin(Stdio::null()).kill_on_drop(true);

    match tokio::time::timeout(DETECTION_TIMEOUT, command.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version = stdout.lines().next().unwrap_or_default().trim().to_string();
            OptimizerStatus::Available { version }
        }
        Ok(Ok(output)) => {
            debug!(exit_code = ?output.status.code(), "gifsicle --version failed");
            OptimizerStatus::Unavailable
        }
        Ok(Err(e)) => {
            debug!(error = %e, "could not spawn gifsicle");
            OptimizerStatus::Unavailable
        }
        Err(_) => {
            debug!("gifsicle --version timed out");
            OptimizerStatus::Unavailable
        }
    }
}
