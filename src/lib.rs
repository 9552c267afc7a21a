//! # SSE Relay - Streaming Event Relay
//!
//! Opens an upstream event-stream connection to a backend service, reframes
//! the raw byte stream into discrete events, and re-emits them to a
//! downstream consumer over its own streaming connection, providing:
//! - A synthetic `connecting` event before any upstream I/O
//! - A bounded connect timeout with cooperative cancellation
//! - Chunk-boundary independent frame reassembly
//! - Exactly one terminal event per session, whatever the failure path
//! - A backend readiness probe before sessions are handed out
//!
//! ## Architecture
//!
//! One session task per request; nothing is shared between sessions:
//! ```text
//!                ┌──────────┐   bytes   ┌──────────┐  frames  ┌────────────┐
//!   backend  ──▶ │ Upstream │ ────────▶ │ Reframer │ ───────▶ │ Downstream │ ──▶ client
//!                └──────────┘           └──────────┘          └────────────┘
//!                      ▲                                            ▲
//!                      └──────── cancel ─── Watchdog ─── terminate ─┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod events;
pub mod http;
pub mod relay;
pub mod types;
pub mod upstream;

// Internal utilities
pub mod observability;

pub use types::{Config, Error, ErrorKind, Result};
