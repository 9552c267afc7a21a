//! Core types for the relay.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Session identifiers
//! - **Errors**: Relay error taxonomy with thiserror derives
//! - **Config**: Server, upstream, and per-session relay configuration

mod config;
mod errors;
mod ids;

pub use config::{
    parse_duration, Config, ObservabilityConfig, RelayConfig, ServerConfig, UpstreamConfig,
    ENV_CONNECT_TIMEOUT, ENV_LISTEN_ADDR, ENV_UPSTREAM_URL,
};
pub use errors::{Error, ErrorKind, Result};
pub use ids::SessionId;
