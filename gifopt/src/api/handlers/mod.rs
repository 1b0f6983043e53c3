//! HTTP request handlers.
//!
//! - [`optimize`]: multipart GIF upload and per-file optimization
//! - [`status`]: optimizer availability and defaults
//!
//! Request-level failures are returned as [`crate::errors::Error`], which renders as
//! `{"error": "..."}` with a matching status code. Failures of a single file never abort the
//! request; they are reported in that file's result instead.

pub mod optimize;
pub mod status;
