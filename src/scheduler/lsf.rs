// src/scheduler/lsf.rs

//! LSF-backed [`BatchSchedulerClient`].
//!
//! One logical submission goes through:
//!
//! ```text
//! Submitting → AwaitingCompletion → ParsingUsage ─┬─ Completed
//!      ▲                                          ├─ RetryWithMoreMemory ─┐
//!      └──────────────────────────────────────────┼───────────────────────┘
//!                                                 └─ OomCapReached
//! ```
//!
//! Submission itself is retried with a linear delay when `bsub` exits with
//! one of the configured transient codes.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::SchedulerSection;
use crate::errors::{PipelineError, Result};
use crate::exec::{CapturedRun, ProcessRunner};
use crate::scheduler::backoff::{next_memory_limit, submit_retry_delay};
use crate::scheduler::submit::{AttemptFiles, submission_line};
use crate::scheduler::usage::parse_usage;
use crate::scheduler::{BatchSchedulerClient, JobOutcome, JobSpec, RemoteJob};
use crate::types::ExitOutcome;

/// What to do after an attempt's usage report has been parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// Not OOM-killed; the exit code is final (zero or not).
    Completed,
    /// OOM-killed; resubmit with this reservation.
    RetryWithMoreMemory(u64),
    /// OOM-killed and out of attempts.
    OomCapReached,
}

/// Decide the next transition for `job` given the OOM attempt cap.
pub fn judge_attempt(job: &RemoteJob, max_oom_attempts: u32) -> AttemptVerdict {
    if !job.oom_killed() {
        return AttemptVerdict::Completed;
    }
    if job.attempt >= max_oom_attempts {
        return AttemptVerdict::OomCapReached;
    }
    AttemptVerdict::RetryWithMoreMemory(next_memory_limit(
        job.spec.memory_limit_mb,
        job.usage.max_memory_ceil_mb(),
    ))
}

/// Result of pushing one attempt through `bsub`, transient retries included.
struct Submission {
    captured: CapturedRun,
    /// `bsub` kept failing with a transient code until the cap.
    exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct LsfClient {
    settings: SchedulerSection,
    runner: ProcessRunner,
}

impl LsfClient {
    pub fn new(settings: SchedulerSection) -> Self {
        Self {
            settings,
            runner: ProcessRunner::new(),
        }
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn settings(&self) -> &SchedulerSection {
        &self.settings
    }

    fn queue(&self) -> Result<&str> {
        self.settings
            .queue
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| PipelineError::ConfigError("[scheduler].queue is not set".to_string()))
    }

    async fn run_job(&self, spec: JobSpec) -> Result<JobOutcome> {
        let queue = self.queue()?.to_string();

        tokio::fs::create_dir_all(&spec.log_dir).await?;

        let mut job = RemoteJob::new(spec);
        let mut memory_history = Vec::new();

        loop {
            memory_history.push(job.spec.memory_limit_mb);
            let files = AttemptFiles::new(&job.spec.log_dir, &job.spec.job_name, job.attempt);
            // LSF appends to existing output files and an old sentinel would
            // end the wait at once.
            files.clear().await?;

            info!(
                job = %job.spec.job_name,
                attempt = job.attempt,
                memory_mb = job.spec.memory_limit_mb,
                "submitting job"
            );
            let line = submission_line(&job.spec, job.spec.memory_limit_mb, &files, &queue, &self.settings);
            let submission = self.submit_with_retry(&line).await?;

            if submission.exhausted {
                warn!(
                    job = %job.spec.job_name,
                    attempts = self.settings.submit_max_attempts,
                    exit_code = submission.captured.outcome.code(),
                    "giving up after transient submission failures"
                );
                job.exit_code = Some(submission.captured.outcome.code());
                return Ok(JobOutcome {
                    job,
                    outcome: submission.captured.outcome,
                    stdout: submission.captured.stdout,
                    stderr: submission.captured.stderr,
                    memory_history,
                });
            }

            if !self.await_sentinel(&files.sentinel).await {
                warn!(
                    job = %job.spec.job_name,
                    sentinel = ?files.sentinel,
                    "completion sentinel never appeared; parsing whatever output exists"
                );
            }

            let stdout = read_lossy(&files.stdout).await;
            let stderr = read_lossy(&files.stderr).await;

            // The summary lands in the job's stdout file; `bsub -K` may echo
            // parts of it on its own stdout too.
            job.usage = parse_usage(&format!("{}\n{}", submission.captured.stdout, stdout));
            job.exit_code = Some(submission.captured.outcome.code());

            debug!(job = %job.spec.job_name, usage = ?job.usage, "parsed resource usage");

            match judge_attempt(&job, self.settings.max_oom_attempts) {
                AttemptVerdict::Completed => {
                    info!(
                        job = %job.spec.job_name,
                        attempt = job.attempt,
                        exit_code = submission.captured.outcome.code(),
                        "job finished"
                    );
                    return Ok(JobOutcome {
                        job,
                        outcome: submission.captured.outcome,
                        stdout,
                        stderr,
                        memory_history,
                    });
                }
                AttemptVerdict::RetryWithMoreMemory(next) => {
                    warn!(
                        job = %job.spec.job_name,
                        attempt = job.attempt,
                        from_mb = job.spec.memory_limit_mb,
                        to_mb = next,
                        max_used_mb = ?job.usage.max_memory_mb,
                        "job hit its memory limit; resubmitting"
                    );
                    job.spec.memory_limit_mb = next;
                    job.attempt += 1;
                }
                AttemptVerdict::OomCapReached => {
                    warn!(
                        job = %job.spec.job_name,
                        attempts = job.attempt,
                        "job hit its memory limit on every allowed attempt"
                    );
                    return Ok(JobOutcome {
                        job,
                        outcome: submission.captured.outcome,
                        stdout,
                        stderr,
                        memory_history,
                    });
                }
            }
        }
    }

    async fn submit_with_retry(&self, line: &str) -> Result<Submission> {
        let max_attempts = self.settings.submit_max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let captured = self.runner.run(line).await.map_err(|e| {
                PipelineError::Scheduler(format!(
                    "could not launch `{}`: {e}",
                    self.settings.submit_binary
                ))
            })?;
            let code = captured.outcome.code();
            let transient = self.settings.transient_exit_codes.contains(&code);

            if !transient {
                return Ok(Submission {
                    captured,
                    exhausted: false,
                });
            }
            if attempt >= max_attempts {
                return Ok(Submission {
                    captured,
                    exhausted: true,
                });
            }

            let delay = submit_retry_delay(self.settings.submit_retry_delay_secs, attempt);
            warn!(
                exit_code = code,
                attempt,
                max_attempts,
                delay_secs = delay.as_secs(),
                "transient submission failure; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Wait for the post-exec hook to touch `sentinel`.
    async fn await_sentinel(&self, sentinel: &Path) -> bool {
        if sentinel.exists() {
            return true;
        }

        let poll = Duration::from_secs(self.settings.poll_interval_secs.max(1));
        let budget = Duration::from_secs(self.settings.completion_timeout_secs);
        let started = Instant::now();

        while started.elapsed() < budget {
            tokio::time::sleep(poll).await;
            if sentinel.exists() {
                debug!(sentinel = ?sentinel, waited_secs = started.elapsed().as_secs(), "sentinel appeared");
                return true;
            }
        }
        false
    }
}

impl BatchSchedulerClient for LsfClient {
    fn check_ready(&self) -> Result<()> {
        self.queue().map(|_| ())
    }

    fn submit_and_wait(
        &self,
        spec: JobSpec,
    ) -> Pin<Box<dyn Future<Output = Result<JobOutcome>> + Send + '_>> {
        Box::pin(self.run_job(spec))
    }
}

async fn read_lossy(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            debug!(path = ?path, error = %e, "job output file not readable");
            String::new()
        }
    }
}
