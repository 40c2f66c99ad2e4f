//! Domain logic for the stem splitter service.
//!
//! Everything here is HTTP-agnostic: upload naming, the job state machine,
//! the on-disk workspace, the external separation engine, zip packaging and
//! the lifecycle manager tying them together.

pub mod archive;
pub mod error;
pub mod job;
pub mod lifecycle;
pub mod separation;
pub mod stems;
pub mod types;
pub mod upload;
pub mod workspace;
