//! HTTP API server for Nimbus.
//!
//! This crate provides the browse surface over a storage bucket:
//! - Full tree and single-folder listings
//! - Folder size with a bounded wait
//! - Presigned download and upload URLs
//! - Session authentication and Prometheus metrics

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::{AuthenticatedUser, TraceId};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
