use crate::pipeline::{OptimizationSettings, OptimizerStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OptimizerInfo {
    /// Whether gifsicle answered `--version` at startup
    pub available: bool,
    /// First line of `gifsicle --version`
    pub version: Option<String>,
}

impl From<&OptimizerStatus> for OptimizerInfo {
    fn from(status: &OptimizerStatus) -> Self {
        match status {
            OptimizerStatus::Available { version } => Self {
                available: true,
                version: Some(version.clone()),
            },
            OptimizerStatus::Unavailable => Self {
                available: false,
                version: None,
            },
        }
    }
}

/// Settings applied when a request omits `lossy` or `colors`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DefaultSettings {
    pub lossy: u16,
    pub colors: u16,
}

impl From<OptimizationSettings> for DefaultSettings {
    fn from(settings: OptimizationSettings) -> Self {
        Self {
            lossy: settings.lossy(),
            colors: settings.colors(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub optimizer: OptimizerInfo,
    pub defaults: DefaultSettings,
}
