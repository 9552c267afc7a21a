//! Event infrastructure — typed relay events and their event-stream framing.
//!
//! The relay forwards upstream frames verbatim; only the events it
//! synthesises itself (`connecting`, terminal `error`) go through the typed
//! model on the way out.

pub mod frame;

pub use frame::{peek_kind, Event, EventKind, FRAME_DELIMITER};
