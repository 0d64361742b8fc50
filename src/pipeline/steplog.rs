// src/pipeline/steplog.rs

//! Per-step log files.
//!
//! ```text
//! LogFile: /scratch/structpipe_host_123_ab12cd34/log_file_2
//! Working path: /scratch/structpipe_host_123_ab12cd34
//! Date: 2026-10-15 09:12:44
//!
//! Command:
//! cd /scratch/structpipe_host_123_ab12cd34 &&
//! maxit -input input_file_1 -output result_file_2;
//! ```
//!
//! followed by whatever the command wrote to stderr.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Local;

use crate::errors::Result;

/// Start a fresh log for a step, overwriting any earlier one.
pub fn write_banner(log_path: &Path, workdir: &Path, command: Option<&str>) -> Result<()> {
    let mut text = format!(
        "LogFile: {}\nWorking path: {}\nDate: {}\n",
        log_path.display(),
        workdir.display(),
        Local::now().format("%Y-%m-%d %H:%M:%S"),
    );

    if let Some(command) = command {
        text.push_str("\nCommand:\n");
        text.push_str(&render_command(command));
        text.push('\n');
    }
    text.push('\n');

    fs::write(log_path, text)?;
    Ok(())
}

/// Put each statement of a compound command on its own line.
pub fn render_command(command: &str) -> String {
    command
        .replace("; ", ";\n")
        .replace(" && ", " &&\n")
        .replace(" || ", " ||\n")
}

/// Append free text to a log, skipping empty input.
pub fn append_text(log_path: &Path, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let mut log = OpenOptions::new().create(true).append(true).open(log_path)?;
    log.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        log.write_all(b"\n")?;
    }
    Ok(())
}
