//! Container-configuration assembly pipeline (§4 of the design: C1-C5).
//!
//! Submodules are organised by the value they resolve, not by CLI flag, so a
//! reader can find "how is memory parsed" without first finding "what flag
//! carries it". [`pipeline`] is the only module that wires the others
//! together into a [`types::ContainerConfiguration`].

pub mod dns;
pub mod env;
pub mod labels;
pub mod memory;
pub mod mount;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod publish;
pub mod resources;
pub mod types;
pub mod user;

pub use pipeline::{assemble, PipelineInput};
pub use types::*;
