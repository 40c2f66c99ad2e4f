//! External source-separation engine.
//!
//! The engine is an opaque collaborator: input path and output root in,
//! exit code and an optional stem directory out. [`SeparationEngine`] is
//! the seam; [`CommandEngine`] is the production implementation that
//! shells out to Demucs.

pub mod command;
pub mod engine;
pub mod subprocess;

pub use command::CommandEngine;
pub use engine::{EngineError, EngineOutput, SeparationEngine};
