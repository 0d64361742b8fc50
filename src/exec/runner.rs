// src/exec/runner.rs

//! Shell command runner.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::process::Command;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::group::{kill_process_group, status_code};
use crate::types::ExitOutcome;

/// Poll interval used while waiting on a command with a timeout.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Output of a command run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRun {
    pub outcome: ExitOutcome,
    pub stdout: String,
    pub stderr: String,
}

/// Runs shell command strings on the local host.
///
/// Command strings are handed to `sh` untouched, so any redirection they
/// embed (`> out 2> err`) is honoured.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    shell: String,
    poll_interval: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run `command` to completion and capture its stdout/stderr.
    pub async fn run(&self, command: &str) -> Result<CapturedRun> {
        debug!(cmd = %command, "running command");

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("running command `{command}`"))?;

        let code = status_code(output.status);
        info!(exit_code = code, "command exited");

        Ok(CapturedRun {
            outcome: ExitOutcome::Code(code),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run `command` with a wall-clock limit.
    ///
    /// The command is written to a temporary script and started as the
    /// leader of a fresh process group, with stdout and stderr appended to
    /// `log_path`. When the limit is exceeded the whole group is killed,
    /// the child is reaped, a diagnostic line is appended to `log_path`, and
    /// [`ExitOutcome::TimedOut`] is returned.
    pub async fn run_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
        log_path: &Path,
    ) -> Result<ExitOutcome> {
        let script = write_script(command, log_path.parent())?;

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("opening log {:?}", log_path))?;
        let log_err = log.try_clone()?;

        let mut child = Command::new(&self.shell)
            .arg(&*script)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning script {:?}", &*script))?;

        let pgid = child.id();
        info!(?pgid, timeout_secs = timeout.as_secs_f64(), "started command with timeout");

        let started = Instant::now();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Some(status) = child.try_wait()? {
                let code = status_code(status);
                info!(?pgid, exit_code = code, "command exited before timeout");
                return Ok(ExitOutcome::Code(code));
            }

            if started.elapsed() >= timeout {
                break;
            }
        }

        warn!(?pgid, timeout_secs = timeout.as_secs_f64(), "command exceeded timeout; killing process group");
        let signalled = pgid.map(kill_process_group).unwrap_or(false);
        if !signalled {
            // Group vanished between polls; make sure the direct child goes.
            let _ = child.start_kill();
        }
        let _ = child.wait().await;

        append_timeout_diagnostic(log_path, timeout)?;
        Ok(ExitOutcome::TimedOut)
    }
}

/// Write `command` into a temporary executable script, next to the log if
/// possible. The script is removed when the returned path is dropped.
fn write_script(command: &str, dir: Option<&Path>) -> Result<tempfile::TempPath> {
    use std::os::unix::fs::PermissionsExt;

    let mut builder = tempfile::Builder::new();
    builder.prefix("structpipe_").suffix(".sh");
    let mut file = match dir {
        Some(d) if d.is_dir() => builder.tempfile_in(d)?,
        _ => builder.tempfile()?,
    };

    writeln!(file, "#!/bin/sh")?;
    writeln!(file, "{command}")?;
    file.flush()?;
    file.as_file()
        .set_permissions(std::fs::Permissions::from_mode(0o700))?;

    Ok(file.into_temp_path())
}

fn append_timeout_diagnostic(log_path: &Path, timeout: Duration) -> Result<()> {
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    writeln!(
        log,
        "\nERROR: command terminated by timeout after {} seconds",
        timeout.as_secs()
    )?;
    Ok(())
}
