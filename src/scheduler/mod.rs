// src/scheduler/mod.rs

//! Remote execution on a batch scheduler.
//!
//! The pipeline talks to a [`BatchSchedulerClient`] instead of a concrete
//! cluster. Production code uses [`LsfClient`]; tests can provide their own
//! implementation that never shells out.
//!
//! - [`submit`] assembles the LSF submission line.
//! - [`usage`] parses the resource-usage summary LSF appends to job output.
//! - [`backoff`] holds the memory escalation and retry-delay rules.
//! - [`lsf`] drives submit → wait → parse → resubmit.

pub mod backoff;
pub mod lsf;
pub mod submit;
pub mod usage;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::errors::Result;
use crate::types::ExitOutcome;

pub use backoff::{next_memory_limit, submit_retry_delay};
pub use lsf::LsfClient;
pub use usage::ResourceUsage;

/// What to run on the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub command: String,
    pub job_name: String,
    /// Directory receiving the job's stdout/stderr files and sentinel.
    pub log_dir: PathBuf,
    /// Wall-clock limit; falls back to the site default when `None`.
    pub timeout_secs: Option<u64>,
    pub num_processors: u32,
    pub memory_limit_mb: u64,
}

/// State of one logical submission, updated after each attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteJob {
    pub spec: JobSpec,
    /// 1-based attempt counter.
    pub attempt: u32,
    pub usage: ResourceUsage,
    pub exit_code: Option<i32>,
}

impl RemoteJob {
    pub fn new(spec: JobSpec) -> Self {
        Self {
            spec,
            attempt: 1,
            usage: ResourceUsage::default(),
            exit_code: None,
        }
    }

    pub fn oom_killed(&self) -> bool {
        self.usage.oom_killed
    }
}

/// Final result of [`BatchSchedulerClient::submit_and_wait`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job: RemoteJob,
    pub outcome: ExitOutcome,
    pub stdout: String,
    pub stderr: String,
    /// Memory reservation used for each attempt, in order.
    pub memory_history: Vec<u64>,
}

/// Trait abstracting how a command is run on the cluster.
///
/// Each call blocks the calling task until the job has completed (or its
/// retries are exhausted); running several jobs at once is the caller's
/// business.
pub trait BatchSchedulerClient: Send + Sync {
    /// Cheap pre-flight check run before a step touches any file.
    fn check_ready(&self) -> Result<()> {
        Ok(())
    }

    fn submit_and_wait(
        &self,
        spec: JobSpec,
    ) -> Pin<Box<dyn Future<Output = Result<JobOutcome>> + Send + '_>>;
}
