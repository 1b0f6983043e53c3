//! HTTP handler reporting optimizer availability.

use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::status::{OptimizerInfo, StatusResponse},
    pipeline::OptimizationSettings,
};

#[utoipa::path(
    get,
    path = "/api/status",
    tag = "status",
    summary = "Get optimizer status",
    description = "Report whether gifsicle was found at startup and which settings apply when a request omits them",
    responses(
        (status = 200, description = "Optimizer status", body = StatusResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let defaults = &state.config.defaults;

    Json(StatusResponse {
        optimizer: OptimizerInfo::from(state.pipeline.optimizer().status()),
        defaults: OptimizationSettings::new(defaults.lossy, defaults.colors).into(),
    })
}
