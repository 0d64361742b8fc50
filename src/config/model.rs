// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::OperationFamily;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [pipeline]
/// work_root = "/scratch/pipeline"
/// run_remote = false
///
/// [scheduler]
/// queue = "production"
/// job_group = "/structpipe"
///
/// [operation.cif2pdb]
/// family = "local_binary"
/// cmd = "maxit -input {input} -output {result} -o 2"
/// ```
///
/// All sections except `[operation.<name>]` are optional.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSiteConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Keys are the operation names passed to `invoke`.
    #[serde(default)]
    pub operation: BTreeMap<String, OperationConfig>,
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawSiteConfig>`.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub pipeline: PipelineSection,
    pub scheduler: SchedulerSection,
    pub operation: BTreeMap<String, OperationConfig>,
}

impl SiteConfig {
    pub(crate) fn new_unchecked(
        pipeline: PipelineSection,
        scheduler: SchedulerSection,
        operation: BTreeMap<String, OperationConfig>,
    ) -> Self {
        Self {
            pipeline,
            scheduler,
            operation,
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PipelineSection {
    /// Directory under which working directories are created.
    ///
    /// Defaults to the system temp dir.
    #[serde(default)]
    pub work_root: Option<PathBuf>,

    /// Ship `remote` operations to the batch scheduler.
    #[serde(default)]
    pub run_remote: bool,

    /// Write the rendered command into each step log.
    #[serde(default)]
    pub debug: bool,

    /// Default local timeout for operations that do not set one.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl PipelineSection {
    pub fn effective_work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_submit_binary")]
    pub submit_binary: String,

    /// Target queue. Required as soon as something is submitted.
    #[serde(default)]
    pub queue: Option<String>,

    #[serde(default)]
    pub job_group: Option<String>,

    #[serde(default = "default_wall_time_minutes")]
    pub wall_time_minutes: u64,

    #[serde(default = "default_memory_mb")]
    pub default_memory_mb: u64,

    #[serde(default = "default_processors")]
    pub default_processors: u32,

    /// Requests above this reservation are tagged with `large_memory_class`.
    #[serde(default = "default_large_memory_threshold_mb")]
    pub large_memory_threshold_mb: u64,

    #[serde(default = "default_large_memory_class")]
    pub large_memory_class: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// How long to wait for the completion sentinel after `bsub -K` returns.
    #[serde(default = "default_completion_timeout_secs")]
    pub completion_timeout_secs: u64,

    #[serde(default = "default_submit_max_attempts")]
    pub submit_max_attempts: u32,

    /// Base delay; attempt `k` waits `k * submit_retry_delay_secs`.
    #[serde(default = "default_submit_retry_delay_secs")]
    pub submit_retry_delay_secs: u64,

    /// Exit codes of the submit client that mean "try again".
    #[serde(default = "default_transient_exit_codes")]
    pub transient_exit_codes: Vec<i32>,

    /// Hard cap on submissions for one logical job when it keeps hitting
    /// its memory limit.
    #[serde(default = "default_max_oom_attempts")]
    pub max_oom_attempts: u32,
}

fn default_submit_binary() -> String {
    "bsub".to_string()
}

fn default_wall_time_minutes() -> u64 {
    24 * 60
}

fn default_memory_mb() -> u64 {
    4000
}

fn default_processors() -> u32 {
    1
}

fn default_large_memory_threshold_mb() -> u64 {
    200_000
}

fn default_large_memory_class() -> String {
    "bigmem".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_completion_timeout_secs() -> u64 {
    300
}

fn default_submit_max_attempts() -> u32 {
    5
}

fn default_submit_retry_delay_secs() -> u64 {
    30
}

fn default_transient_exit_codes() -> Vec<i32> {
    vec![141, 255]
}

fn default_max_oom_attempts() -> u32 {
    5
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            submit_binary: default_submit_binary(),
            queue: None,
            job_group: None,
            wall_time_minutes: default_wall_time_minutes(),
            default_memory_mb: default_memory_mb(),
            default_processors: default_processors(),
            large_memory_threshold_mb: default_large_memory_threshold_mb(),
            large_memory_class: default_large_memory_class(),
            poll_interval_secs: default_poll_interval_secs(),
            completion_timeout_secs: default_completion_timeout_secs(),
            submit_max_attempts: default_submit_max_attempts(),
            submit_retry_delay_secs: default_submit_retry_delay_secs(),
            transient_exit_codes: default_transient_exit_codes(),
            max_oom_attempts: default_max_oom_attempts(),
        }
    }
}

/// `[operation.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationConfig {
    pub family: OperationFamily,

    /// Command template, see [`TemplateCommandBuilder`](crate::pipeline::TemplateCommandBuilder)
    /// for the placeholders.
    pub cmd: String,

    /// Expected result files. If empty, the step's `result_file_n`.
    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub required_params: Vec<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub memory_mb: Option<u64>,

    #[serde(default)]
    pub processors: Option<u32>,
}
