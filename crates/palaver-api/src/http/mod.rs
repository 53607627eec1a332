//! HTTP/REST API layer for Palaver.
//!
//! Axum-based REST API at `/api/v1/` with SSE chat streaming, envelope
//! response format, and CORS support.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
