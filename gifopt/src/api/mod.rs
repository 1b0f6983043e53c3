//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - `POST /api/optimize-gif`: batch GIF optimization over multipart uploads
//! - `GET /api/status`: optimizer availability and default settings
//!
//! All endpoints are documented with `utoipa`; the rendered documentation is served at `/docs`.

pub mod handlers;
pub mod models;
