//! Downstream HTTP surface.
//!
//! Routes:
//!   GET  /health              relay liveness
//!   GET  /api/generate-docs   open a relay session (event-stream response)
//!   POST /api/generate-docs   probe the backend, hand out a stream URL

pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_router, AppState, STREAM_ROUTE};
pub use server::RelayServer;
