//! Off-request execution of separation jobs.

pub mod runner;

pub use runner::{JobHandle, JobSnapshot};
