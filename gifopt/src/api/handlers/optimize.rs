//! HTTP handler for batch GIF optimization.

use crate::{
    AppState,
    api::models::optimize::{ErrorResponse, FileResult, OptimizeResponse},
    errors::{Error, Result},
    pipeline::{OptimizationSettings, Pipeline, PipelineError},
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

const GIF_MIME_TYPE: &str = "image/gif";

/// Content type assumed for file parts that do not declare one.
const DEFAULT_PART_MIME_TYPE: &str = "application/octet-stream";

/// Why one uploaded file has no optimized output. Only that file's result carries it.
#[derive(Debug, ThisError)]
enum FileError {
    #[error("File is not a GIF file ({mime_type}).")]
    NotAGif { mime_type: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// One `file` part, fully buffered.
#[derive(Debug)]
struct UploadedFile {
    filename: String,
    mime_type: String,
    bytes: Bytes,
}

#[utoipa::path(
    post,
    path = "/api/optimize-gif",
    tag = "optimize",
    summary = "Optimize GIFs",
    description = "Halve the frame count of each uploaded GIF and recompress it with gifsicle. \
        Send one or more `file` parts plus optional `lossy` (0-300, default 200) and `colors` \
        (2-256, default 64) text fields. Out-of-range settings are clamped. A failure on one \
        file is reported in its result and does not affect the others.",
    request_body(
        content_type = "multipart/form-data",
        description = "GIF files under `file`, with optional `lossy` and `colors` fields"
    ),
    responses(
        (status = 200, description = "Per-file results in upload order", body = OptimizeResponse),
        (status = 400, description = "No files, malformed multipart body or non-integer settings", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn optimize_gif(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<OptimizeResponse>> {
    let limit = state.config.limits.max_upload_size;
    let mut files = Vec::new();
    let mut lossy = None;
    let mut colors = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        let field_name = field.name().unwrap_or_default().to_string();

        match field_name.as_str() {
            "file" => {
                let filename = secure_filename(field.file_name().unwrap_or_default());
                let mime_type = field.content_type().unwrap_or(DEFAULT_PART_MIME_TYPE).to_string();
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                debug!(filename = %filename, mime_type = %mime_type, size = bytes.len(), "Received file part");
                files.push(UploadedFile { filename, mime_type, bytes });
            }
            // the first occurrence of a setting wins
            "lossy" => {
                let value = field.text().await.map_err(|e| multipart_error(e, limit))?;
                lossy.get_or_insert(value);
            }
            "colors" => {
                let value = field.text().await.map_err(|e| multipart_error(e, limit))?;
                colors.get_or_insert(value);
            }
            _ => {
                debug!(field = %field_name, "Ignoring unknown multipart field");
            }
        }
    }

    if files.is_empty() {
        return Err(Error::BadRequest {
            message: "No files found under the expected \"file\" key.".to_string(),
        });
    }

    let settings = OptimizationSettings::from_form(lossy.as_deref(), colors.as_deref(), &state.config.defaults).map_err(|e| {
        debug!(field = e.field, value = %e.value, "Rejected optimization setting");
        Error::BadRequest { message: e.to_string() }
    })?;

    info!(
        files = files.len(),
        lossy = settings.lossy(),
        colors = settings.colors(),
        "Optimizing uploaded GIFs"
    );

    // one file at a time, in upload order
    let mut results = Vec::with_capacity(files.len());
    for file in files {
        results.push(optimize_file(&state.pipeline, file, settings).await);
    }

    Ok(Json(OptimizeResponse { results }))
}

async fn optimize_file(pipeline: &Pipeline, file: UploadedFile, settings: OptimizationSettings) -> FileResult {
    let UploadedFile { filename, mime_type, bytes } = file;
    let original_size = bytes.len() as u64;

    match process_file(pipeline, &mime_type, &bytes, settings).await {
        Ok(optimized) => {
            let optimized_size = optimized.len() as u64;
            FileResult::optimized(filename, original_size, BASE64.encode(&optimized), optimized_size)
        }
        Err(e) => {
            warn!(filename = %filename, error = %e, "GIF could not be optimized");
            FileResult::failed(filename, original_size, e.to_string())
        }
    }
}

async fn process_file(
    pipeline: &Pipeline,
    mime_type: &str,
    bytes: &[u8],
    settings: OptimizationSettings,
) -> std::result::Result<Vec<u8>, FileError> {
    if !is_gif(mime_type) {
        return Err(FileError::NotAGif {
            mime_type: mime_type.to_string(),
        });
    }
    Ok(pipeline.process(bytes, settings).await?)
}

/// Whether a declared content type is `image/gif`, ignoring parameters and case.
fn is_gif(mime_type: &str) -> bool {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case(GIF_MIME_TYPE)
}

fn multipart_error(e: MultipartError, limit: u64) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {}", e),
        }
    }
}

/// Reduce a client-supplied filename to a safe, flat ASCII name.
///
/// Path separators become word breaks, whitespace runs become `_`, anything outside
/// `[A-Za-z0-9_.-]` is dropped, and leading or trailing `.` and `_` are trimmed, so
/// `../../etc/passwd` becomes `etc_passwd`. The result may be empty.
pub fn secure_filename(name: &str) -> String {
    let flattened: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}
