pub mod job;
pub mod ui;
