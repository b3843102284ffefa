//! HTTP request handlers.
//!
//! - [`chat`]: the relay pipeline behind `POST /api/v1/chat`
//! - [`static_assets`]: embedded chat widget serving
//!
//! Handlers return [`crate::errors::Error`] which converts to the
//! appropriate HTTP status and structured JSON error body.

pub mod chat;
pub mod static_assets;
