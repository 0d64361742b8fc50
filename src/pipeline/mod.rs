// src/pipeline/mod.rs

//! Step-chained execution pipeline.
//!
//! A [`StepPipeline`] owns one ephemeral working directory and runs a chain
//! of operations over it. Step `n` reads the previous step's result (or a
//! result picked with [`StepPipeline::use_result`]) and writes its own
//! `result_file_n`, `log_file_n`, `error_file_n` next to it.
//!
//! - [`workdir`] allocates and names the working directory and the per-step
//!   file layout.
//! - [`params`] is the typed parameter set handed to `invoke`.
//! - [`registry`] maps operation names to families and validates parameters.
//! - [`command`] is the seam to whatever turns an operation into a command
//!   line; [`TemplateCommandBuilder`] is the config-driven default.
//! - [`steplog`] writes the per-step log banner.
//! - [`core`] is the pipeline state machine itself.

pub mod command;
pub mod core;
pub mod params;
pub mod registry;
pub mod steplog;
pub mod workdir;

pub use command::{CommandContext, CommandSpec, OperationCommandBuilder, TemplateCommandBuilder};
pub use core::{PipelineState, StepPipeline, StepRecord};
pub use params::{InputParameterSet, ParamValue};
pub use registry::OperationRegistry;
pub use workdir::{StepPaths, WorkingDirectory};
