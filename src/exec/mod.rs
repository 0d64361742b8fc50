// src/exec/mod.rs

//! Local process execution layer.
//!
//! - [`runner`] owns [`ProcessRunner`], which runs shell command strings
//!   either to completion (capturing stdout/stderr) or under a timeout.
//! - [`group`] holds the process-group helpers used to kill a timed-out
//!   command together with everything it spawned.

pub mod group;
pub mod runner;

pub use runner::{CapturedRun, ProcessRunner};
