// src/pipeline/core.rs

//! Pipeline state machine.
//!
//! ```text
//! Uninitialized ──import──▶ Staged ──invoke──▶ Executing ──▶ Completed
//!                                                  ▲              │
//!                                                  └───invoke─────┘
//! any state ──cleanup──▶ Closed
//! ```
//!
//! Every public operation reports failure through its return value and a
//! `tracing` event; nothing here returns an `Err` to the caller.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{PipelineSection, SiteConfig};
use crate::errors::Result;
use crate::exec::ProcessRunner;
use crate::pipeline::command::{CommandContext, OperationCommandBuilder, TemplateCommandBuilder};
use crate::pipeline::params::InputParameterSet;
use crate::pipeline::registry::OperationRegistry;
use crate::pipeline::steplog;
use crate::pipeline::workdir::{StepPaths, WorkingDirectory};
use crate::results::{ResultSet, append_file, copy_file};
use crate::scheduler::{BatchSchedulerClient, JobOutcome, JobSpec, LsfClient};
use crate::types::ExitOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Staged,
    Executing,
    Completed,
    Closed,
}

/// What happened in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: usize,
    pub op: String,
    /// File the step consumed.
    pub input: PathBuf,
    pub paths: StepPaths,
    pub outcome: ExitOutcome,
    pub results: ResultSet,
    pub remote: bool,
}

#[derive(Debug, Clone, Copy)]
struct JobDefaults {
    memory_mb: u64,
    processors: u32,
}

/// Orchestrates a chain of external-tool invocations over staged files.
///
/// One instance owns one working directory and runs one step at a time.
pub struct StepPipeline<S: BatchSchedulerClient> {
    settings: PipelineSection,
    job_defaults: JobDefaults,
    registry: Arc<OperationRegistry>,
    builder: Box<dyn OperationCommandBuilder>,
    runner: ProcessRunner,
    scheduler: S,

    workdir: Option<WorkingDirectory>,
    source: Option<PathBuf>,
    step: usize,
    /// One-shot input redirection set by `use_result`.
    input_override: Option<usize>,
    records: Vec<StepRecord>,
    state: PipelineState,
}

impl<S: BatchSchedulerClient> std::fmt::Debug for StepPipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepPipeline")
            .field("state", &self.state)
            .field("step", &self.step)
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

impl StepPipeline<LsfClient> {
    /// Pipeline submitting remote steps to LSF as configured in `[scheduler]`.
    pub fn from_config(cfg: &SiteConfig) -> Self {
        Self::new(cfg, LsfClient::new(cfg.scheduler.clone()))
    }
}

impl<S: BatchSchedulerClient> StepPipeline<S> {
    pub fn new(cfg: &SiteConfig, scheduler: S) -> Self {
        let registry = Arc::new(OperationRegistry::from_config(cfg));
        Self {
            settings: cfg.pipeline.clone(),
            job_defaults: JobDefaults {
                memory_mb: cfg.scheduler.default_memory_mb,
                processors: cfg.scheduler.default_processors,
            },
            builder: Box::new(TemplateCommandBuilder::new(Arc::clone(&registry))),
            registry,
            runner: ProcessRunner::new(),
            scheduler,
            workdir: None,
            source: None,
            step: 0,
            input_override: None,
            records: Vec::new(),
            state: PipelineState::Uninitialized,
        }
    }

    pub fn with_builder(mut self, builder: Box<dyn OperationCommandBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn set_run_remote(&mut self, run_remote: bool) {
        self.settings.run_remote = run_remote;
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.settings.debug = debug;
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(|w| w.path())
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn last_record(&self) -> Option<&StepRecord> {
        self.records.last()
    }

    /// Stage `source` as `input_file_1` and restart step numbering.
    ///
    /// A missing source is not an error: the pipeline is left without a
    /// source and `false` is returned.
    pub fn import(&mut self, source: impl AsRef<Path>) -> bool {
        let source = source.as_ref();

        if self.state == PipelineState::Closed {
            warn!(source = ?source, "import on a cleaned-up pipeline ignored");
            return false;
        }
        if !source.exists() {
            warn!(source = ?source, "import source does not exist");
            self.source = None;
            return false;
        }

        let root = match self.ensure_workdir() {
            Ok(root) => root,
            Err(e) => {
                error!(error = %e, "could not allocate working directory");
                return false;
            }
        };

        self.step = 0;
        self.input_override = None;
        self.records.clear();

        let staged = StepPaths::new(&root, 1).input;
        if !copy_file(source, &staged) {
            error!(source = ?source, dest = ?staged, "failed to stage import");
            self.source = None;
            return false;
        }

        info!(source = ?source, staged = ?staged, "imported source");
        self.source = Some(source.to_path_buf());
        self.state = PipelineState::Staged;
        true
    }

    /// Run `op` as the next step.
    ///
    /// Returns [`ExitOutcome::Rejected`] without side effects when the
    /// operation is unknown, nothing was staged and no parameters were given,
    /// the parameters do not satisfy the operation, or the pipeline was
    /// cleaned up.
    pub async fn invoke(&mut self, op: &str, params: &InputParameterSet) -> ExitOutcome {
        if self.state == PipelineState::Closed {
            warn!(op, "invoke on a cleaned-up pipeline ignored");
            return ExitOutcome::Rejected;
        }
        let Some(family) = self.registry.family_of(op) else {
            warn!(op, "unknown operation");
            return ExitOutcome::Rejected;
        };
        if self.source.is_none() && params.is_empty() {
            warn!(op, "nothing imported and no parameters given");
            return ExitOutcome::Rejected;
        }
        if let Err(e) = self.registry.validate_params(op, params) {
            warn!(op, error = %e, "invalid parameters");
            return ExitOutcome::Rejected;
        }
        let remote = self.settings.run_remote && family.remote_eligible();
        if remote {
            if let Err(e) = self.scheduler.check_ready() {
                warn!(op, error = %e, "scheduler not usable");
                return ExitOutcome::Rejected;
            }
        }

        let root = match self.ensure_workdir() {
            Ok(root) => root,
            Err(e) => {
                error!(op, error = %e, "could not allocate working directory");
                return ExitOutcome::Rejected;
            }
        };

        self.step += 1;
        let step = self.step;
        let paths = StepPaths::new(&root, step);
        let input = self.resolve_input(&root, step);

        self.state = PipelineState::Executing;
        info!(step, op, ?family, remote, input = ?input, "invoking operation");

        let (outcome, expected) = match self
            .execute(op, remote, &root, &paths, &input, params)
            .await
        {
            Ok(done) => done,
            Err(e) => {
                error!(step, op, error = %e, "step failed before producing an exit code");
                let _ = steplog::append_text(&paths.log, &format!("ERROR: {e}"));
                (ExitOutcome::Rejected, vec![paths.result.clone()])
            }
        };

        if !outcome.success() {
            warn!(step, op, %outcome, "step did not succeed");
        }

        self.records.push(StepRecord {
            step,
            op: op.to_string(),
            input,
            results: ResultSet::from_expected(expected),
            paths,
            outcome,
            remote,
        });
        self.state = PipelineState::Completed;
        outcome
    }

    async fn execute(
        &self,
        op: &str,
        remote: bool,
        root: &Path,
        paths: &StepPaths,
        input: &Path,
        params: &InputParameterSet,
    ) -> Result<(ExitOutcome, Vec<PathBuf>)> {
        let ctx = CommandContext {
            op,
            workdir: root,
            paths,
            input,
            params,
        };
        let spec = self.builder.build(&ctx)?;

        // A re-import restarts numbering in the same directory.
        for stale in [&paths.result, &paths.error, &paths.temp]
            .into_iter()
            .chain(spec.result_paths.iter())
            .filter(|p| p.as_path() != input)
        {
            remove_stale(stale)?;
        }

        let shown = self.settings.debug.then_some(spec.command.as_str());
        steplog::write_banner(&paths.log, root, shown)?;
        debug!(step = paths.step, cmd = %spec.command, "built command");

        let outcome = if remote {
            let job = JobSpec {
                command: spec.command.clone(),
                job_name: format!("{op}_{}", paths.step),
                log_dir: root.to_path_buf(),
                timeout_secs: spec.timeout_secs,
                num_processors: spec.processors.unwrap_or(self.job_defaults.processors),
                memory_limit_mb: spec.memory_mb.unwrap_or(self.job_defaults.memory_mb),
            };
            let done = self.scheduler.submit_and_wait(job).await?;
            fs::write(&paths.error, &done.stderr)?;
            steplog::append_text(&paths.log, &done.stderr)?;
            steplog::append_text(&paths.log, &usage_line(&done))?;
            done.outcome
        } else if let Some(secs) = spec.timeout_secs.or(self.settings.timeout_secs) {
            self.runner
                .run_with_timeout(&spec.command, Duration::from_secs(secs), &paths.log)
                .await?
        } else {
            let run = self.runner.run(&spec.command).await?;
            if !run.stdout.is_empty() {
                debug!(step = paths.step, stdout = %run.stdout.trim_end(), "command stdout");
            }
            fs::write(&paths.error, &run.stderr)?;
            steplog::append_text(&paths.log, &run.stderr)?;
            run.outcome
        };

        Ok((outcome, spec.result_paths))
    }

    /// Copy the latest step's result to `dest`.
    pub fn export(&self, dest: impl AsRef<Path>) -> bool {
        match self.current_paths() {
            Some(paths) => copy_file(&paths.result, dest.as_ref()),
            None => {
                debug!("export requested before any step ran");
                false
            }
        }
    }

    /// Copy the latest step's declared results onto `dests` by position.
    ///
    /// All pairs are attempted; `false` if any of them failed.
    pub fn export_list<P: AsRef<Path>>(&self, dests: &[P]) -> bool {
        match self.records.last() {
            Some(record) if self.workdir.is_some() => record.results.copy_to(dests),
            _ => {
                debug!("export_list requested before any step ran");
                false
            }
        }
    }

    /// Copy (or append) the current step's log to `dest`.
    pub fn export_log(&self, dest: impl AsRef<Path>, append: bool) -> bool {
        self.current_paths()
            .is_some_and(|p| transfer(&p.log, dest.as_ref(), append))
    }

    /// Copy (or append) the current step's error file to `dest`.
    pub fn export_error_log(&self, dest: impl AsRef<Path>, append: bool) -> bool {
        self.current_paths()
            .is_some_and(|p| transfer(&p.error, dest.as_ref(), append))
    }

    /// Write every step's log, in step order, into `dest`.
    pub fn export_log_all(&self, dest: impl AsRef<Path>) -> bool {
        let dest = dest.as_ref();
        let Some(workdir) = self.workdir.as_ref() else {
            return false;
        };
        if self.step == 0 {
            return false;
        }
        if let Err(e) = fs::write(dest, b"") {
            warn!(dest = ?dest, error = %e, "could not create combined log");
            return false;
        }

        let mut all_ok = true;
        for step in 1..=self.step {
            all_ok &= append_file(&workdir.step(step).log, dest);
        }
        all_ok
    }

    /// Current step number, to be passed to [`use_result`](Self::use_result) later.
    pub fn save_result(&self) -> usize {
        self.step
    }

    /// Feed step `n`'s result to the next `invoke` instead of the latest one.
    ///
    /// Ignored unless `1 <= n <= current_step()`.
    pub fn use_result(&mut self, n: usize) {
        if (1..=self.step).contains(&n) {
            debug!(step = n, "next invoke will read this step's result");
            self.input_override = Some(n);
        } else {
            debug!(step = n, current = self.step, "use_result out of range; ignored");
        }
    }

    /// Remove the working directory. The pipeline accepts no further steps.
    pub fn cleanup(&mut self) {
        if let Some(workdir) = self.workdir.take() {
            workdir.remove();
        }
        self.source = None;
        self.input_override = None;
        self.state = PipelineState::Closed;
    }

    fn ensure_workdir(&mut self) -> Result<PathBuf> {
        if let Some(workdir) = self.workdir.as_ref() {
            return Ok(workdir.path().to_path_buf());
        }
        let workdir = WorkingDirectory::allocate(&self.settings.effective_work_root())?;
        let root = workdir.path().to_path_buf();
        self.workdir = Some(workdir);
        Ok(root)
    }

    fn resolve_input(&mut self, root: &Path, step: usize) -> PathBuf {
        match self.input_override.take() {
            Some(saved) => StepPaths::new(root, saved).result,
            None if step == 1 => StepPaths::new(root, 1).input,
            None => StepPaths::new(root, step - 1).result,
        }
    }

    fn current_paths(&self) -> Option<StepPaths> {
        let workdir = self.workdir.as_ref()?;
        (self.step > 0).then(|| workdir.step(self.step))
    }
}

fn remove_stale(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Ok(());
    }
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = ?path, "removed stale step file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn transfer(src: &Path, dest: &Path, append: bool) -> bool {
    if append {
        append_file(src, dest)
    } else {
        copy_file(src, dest)
    }
}

fn usage_line(done: &JobOutcome) -> String {
    let u = &done.job.usage;
    format!(
        "Remote job {}: attempts={} memory_limit_mb={} max_memory_mb={} avg_memory_mb={} cpu_time_secs={} wall_time_secs={} max_threads={} max_processes={} oom_killed={}",
        done.job.spec.job_name,
        done.job.attempt,
        done.job.spec.memory_limit_mb,
        fmt_opt(u.max_memory_mb),
        fmt_opt(u.avg_memory_mb),
        fmt_opt(u.cpu_time_secs),
        fmt_opt(u.wall_time_secs),
        fmt_opt(u.max_threads),
        fmt_opt(u.max_processes),
        u.oom_killed,
    )
}

fn fmt_opt<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
