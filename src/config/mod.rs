// src/config/mod.rs

//! Site configuration for structpipe.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate required site values and numeric sanity (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    OperationConfig, PipelineSection, RawSiteConfig, SchedulerSection, SiteConfig,
};
