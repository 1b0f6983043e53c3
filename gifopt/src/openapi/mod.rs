//! OpenAPI documentation for the HTTP API.
//!
//! The document is served as JSON at `/api-docs/openapi.json` and rendered with Scalar at
//! `/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "gifopt API",
        description = "Halve the frame count of animated GIFs and recompress them with gifsicle."
    ),
    paths(
        api::handlers::optimize::optimize_gif,
        api::handlers::status::get_status,
    ),
    components(
        schemas(
            api::models::optimize::FileResult,
            api::models::optimize::OptimizeResponse,
            api::models::optimize::ErrorResponse,
            api::models::status::StatusResponse,
            api::models::status::OptimizerInfo,
            api::models::status::DefaultSettings,
        )
    ),
    tags(
        (name = "optimize", description = "Batch GIF optimization.

Every uploaded GIF is decoded, every other frame is dropped (the delay of the remaining frames \
is doubled so playback length is preserved), and the result is recompressed with \
`gifsicle -O3 --lossy=<lossy> --colors <colors>`. The optimized file is returned base64-encoded."),
        (name = "status", description = "Optimizer availability."),
    )
)]
pub struct ApiDoc;
