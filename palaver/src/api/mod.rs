//! API layer for HTTP request handling and data models.
//!
//! This module contains the relay's HTTP surface, organized into:
//!
//! - **[`handlers`]**: Axum route handlers (chat relay, widget assets)
//! - **[`models`]**: Request/response data structures
//! - **[`payload`]**: Content-type dispatch and body decoding for the chat
//!   endpoint's two accepted encodings
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`;
//! the rendered documentation is served at `/docs`.

pub mod handlers;
pub mod models;
pub mod payload;
