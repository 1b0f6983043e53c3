use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outcome for one uploaded file. Every field is always present; the ones that do not apply are `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileResult {
    /// Sanitized client-supplied filename
    pub filename: String,
    /// Size of the upload in bytes
    pub original_size: u64,
    /// Base64 (standard alphabet, padded) of the optimized GIF
    pub optimized_data: Option<String>,
    pub optimized_size: Option<u64>,
    /// Why this file could not be optimized
    pub error: Option<String>,
}

impl FileResult {
    pub fn optimized(filename: String, original_size: u64, optimized_data: String, optimized_size: u64) -> Self {
        Self {
            filename,
            original_size,
            optimized_data: Some(optimized_data),
            optimized_size: Some(optimized_size),
            error: None,
        }
    }

    pub fn failed(filename: String, original_size: u64, error: String) -> Self {
        Self {
            filename,
            original_size,
            optimized_data: None,
            optimized_size: None,
            error: Some(error),
        }
    }
}

/// Results in upload order
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OptimizeResponse {
    pub results: Vec<FileResult>,
}

/// Body of every non-2xx response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
