//! API request and response data models.
//!
//! - [`optimize`]: multipart form description and per-file results
//! - [`status`]: optimizer availability report

pub mod optimize;
pub mod status;
