//! Types shared between the `vessel` daemon and its CLI: the error taxonomy
//! and a handful of process-wide constants. Kept in its own crate so the
//! CLI binary can depend on the error type without pulling in the full
//! pipeline/daemon machinery.

pub mod constants;
pub mod errors;

pub use errors::{Error, Result};
