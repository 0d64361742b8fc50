// src/scheduler/submit.rs

//! LSF submission line assembly.
//!
//! The line is handed to `sh -c`, so every free-form value is wrapped in
//! double quotes with `\`, `"`, `$` and backquote escaped. That keeps the
//! local shell from expanding variables in the user command; they are
//! expanded by the shell on the execution host instead.

use std::path::{Path, PathBuf};

use crate::config::SchedulerSection;
use crate::scheduler::JobSpec;

/// Per-attempt file locations inside the job's log directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFiles {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    /// Touched by the post-exec hook once the job has finished.
    pub sentinel: PathBuf,
}

impl AttemptFiles {
    pub fn new(log_dir: &Path, job_name: &str, attempt: u32) -> Self {
        let stem = format!("{job_name}.a{attempt}");
        Self {
            stdout: log_dir.join(format!("{stem}.out")),
            stderr: log_dir.join(format!("{stem}.err")),
            sentinel: log_dir.join(format!("{stem}.done")),
        }
    }

    /// Remove whatever an earlier submission under the same name left.
    pub async fn clear(&self) -> std::io::Result<()> {
        for path in [&self.stdout, &self.stderr, &self.sentinel] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Escape `s` for use inside a double-quoted shell word.
pub fn escape_command(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", escape_command(s))
}

fn quoted_path(p: &Path) -> String {
    quoted(&p.to_string_lossy())
}

/// Wall-clock limit in whole minutes, rounding up.
fn wall_minutes(spec: &JobSpec, settings: &SchedulerSection) -> u64 {
    match spec.timeout_secs {
        Some(secs) => secs.div_ceil(60).max(1),
        None => settings.wall_time_minutes,
    }
}

/// Build the full submission line for one attempt.
///
/// `queue` is passed separately because its presence is checked by the
/// caller before any file I/O happens.
pub fn submission_line(
    spec: &JobSpec,
    memory_mb: u64,
    files: &AttemptFiles,
    queue: &str,
    settings: &SchedulerSection,
) -> String {
    let mut parts: Vec<String> = vec![
        settings.submit_binary.clone(),
        "-J".to_string(),
        quoted(&spec.job_name),
        "-o".to_string(),
        quoted_path(&files.stdout),
        "-e".to_string(),
        quoted_path(&files.stderr),
        "-Ep".to_string(),
        quoted(&format!("touch {}", shell_word(&files.sentinel))),
        "-q".to_string(),
        quoted(queue),
    ];

    if let Some(group) = settings.job_group.as_deref().filter(|g| !g.is_empty()) {
        parts.push("-g".to_string());
        parts.push(quoted(group));
    }

    parts.push("-n".to_string());
    parts.push(spec.num_processors.to_string());
    parts.push("-W".to_string());
    parts.push(wall_minutes(spec, settings).to_string());
    parts.push("-M".to_string());
    parts.push(memory_mb.to_string());
    parts.push("-R".to_string());
    parts.push(quoted(&format!("rusage[mem={memory_mb}]")));

    if memory_mb > settings.large_memory_threshold_mb {
        parts.push("-P".to_string());
        parts.push(quoted(&settings.large_memory_class));
    }

    parts.push("-K".to_string());
    parts.push(quoted(&spec.command));

    parts.join(" ")
}

/// Single-quote a path for the remote `touch`.
fn shell_word(p: &Path) -> String {
    format!("'{}'", p.to_string_lossy().replace('\'', r"'\''"))
}
