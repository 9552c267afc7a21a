//! Event reframer and relay.
//!
//! - [`Reframer`]: reassembly buffer that splits raw upstream bytes into frames
//! - [`Downstream`]: guarded sink enforcing a single terminal transition
//! - [`Relay`]: spawns one session per trigger and drives its state machine

pub mod downstream;
pub mod reframer;
pub mod session;
mod watchdog;

pub use downstream::{Downstream, WriteOutcome};
pub use reframer::Reframer;
pub use session::{Relay, RelayStream, SessionOutcome, SessionState};
