//! # gifopt: GIF optimization service
//!
//! `gifopt` accepts animated GIFs over HTTP, halves their frame count and recompresses them with
//! [gifsicle](https://www.lcdf.org/gifsicle/), returning the result inline as base64 JSON.
//!
//! ## Request Flow
//!
//! A client posts one or more GIFs as `file` parts of a multipart form to `/api/optimize-gif`,
//! optionally with `lossy` and `colors` settings. The handler ([`api::handlers::optimize`])
//! validates the request as a whole, then hands each file in turn to the shared [`Pipeline`]:
//!
//! 1. the upload is written to a scratch file,
//! 2. frames at even indices are kept and their delay doubled ([`pipeline::frames`]),
//! 3. gifsicle recompresses the reduced animation under a timeout ([`pipeline::gifsicle`]),
//! 4. the optimized bytes are read back and every scratch file is removed.
//!
//! A file that fails (not a GIF, undecodable, gifsicle error) gets an `error` in its own result;
//! the other files are unaffected and the response is still `200 OK`.
//!
//! ## Configuration
//!
//! Settings come from a YAML file and `GIFOPT_`-prefixed environment variables; see [`config`].
//! gifsicle is detected once at startup. If it is missing the service still starts and every file
//! is answered with an unavailability error; `GET /api/status` reports what was detected.
//!
//! ## Running
//!
//! ```bash
//! gifopt -f config.yaml
//! curl -F file=@cat.gif -F lossy=120 http://localhost:5000/api/optimize-gif
//! ```

pub mod api;
pub mod config;
pub mod errors;
mod openapi;
pub mod pipeline;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use crate::config::CorsOrigin;
use crate::openapi::ApiDoc;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
pub use pipeline::Pipeline;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: Arc<Pipeline>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors = &config.cors;

    let allow_origin = if cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let origins = cors
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin {
                CorsOrigin::Url(url) => Some(url.origin().ascii_serialization().parse::<HeaderValue>()),
                CorsOrigin::Wildcard => None,
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    let mut layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::CONTENT_TYPE]);

    if let Some(max_age) = cors.max_age {
        layer = layer.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(layer)
}

/// Build the router: API routes, health check, OpenAPI docs, CORS and request tracing.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors_layer = create_cors_layer(&state.config)?;
    let upload_limit = usize::try_from(state.config.limits.max_upload_size).unwrap_or(usize::MAX);

    let api_routes = Router::new()
        .route(
            "/optimize-gif",
            post(api::handlers::optimize::optimize_gif).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/status", get(api::handlers::status::get_status))
        .with_state(state);

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Owns the router and configuration for the lifetime of the process.
///
/// 1. **Create**: [`Application::new`] creates the scratch directory, detects gifsicle and
///    builds the router
/// 2. **Serve**: [`Application::serve`] binds the listener and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting gifopt with configuration: {:#?}", config);

        let pipeline = Pipeline::from_config(&config).await?;
        Self::with_pipeline(config, pipeline)
    }

    /// Build around an already constructed pipeline.
    pub fn with_pipeline(config: Config, pipeline: Pipeline) -> anyhow::Result<Self> {
        let state = AppState {
            config: config.clone(),
            pipeline: Arc::new(pipeline),
        };
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "gifopt listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CorsOrigin;
    use crate::test_utils::{create_test_app, create_test_config};
    use axum::http::{HeaderName, HeaderValue, StatusCode};

    #[test_log::test(tokio::test)]
    async fn test_healthz() {
        let tmp = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(tmp.path()), None).await;

        let response = server.get("/healthz").await;

        response.assert_status(StatusCode::OK);
        response.assert_text("OK");
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_route_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(tmp.path()), None).await;

        server.get("/api/nope").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[test_log::test(tokio::test)]
    async fn test_optimize_requires_post() {
        let tmp = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(tmp.path()), None).await;

        server.get("/api/optimize-gif").await.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test_log::test(tokio::test)]
    async fn test_cors_wildcard_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(tmp.path()), None).await;

        let response = server
            .get("/api/status")
            .add_header(HeaderName::from_static("origin"), HeaderValue::from_static("https://anywhere.example"))
            .await;

        assert_eq!(response.header("access-control-allow-origin"), "*");
    }

    #[test_log::test(tokio::test)]
    async fn test_cors_explicit_origins() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = create_test_config(tmp.path());
        config.cors.allowed_origins = vec![CorsOrigin::Url("https://app.example.com".parse().unwrap())];
        let server = create_test_app(config, None).await;

        let allowed = server
            .get("/api/status")
            .add_header(HeaderName::from_static("origin"), HeaderValue::from_static("https://app.example.com"))
            .await;
        assert_eq!(allowed.header("access-control-allow-origin"), "https://app.example.com");

        let denied = server
            .get("/api/status")
            .add_header(HeaderName::from_static("origin"), HeaderValue::from_static("https://evil.example"))
            .await;
        assert!(denied.headers().get("access-control-allow-origin").is_none());
    }
}
