// src/pipeline/workdir.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::Result;

/// Deterministic per-step file layout inside a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPaths {
    pub step: usize,
    pub input: PathBuf,
    pub result: PathBuf,
    pub log: PathBuf,
    pub error: PathBuf,
    pub temp: PathBuf,
}

impl StepPaths {
    pub fn new(root: &Path, step: usize) -> Self {
        Self {
            step,
            input: root.join(format!("input_file_{step}")),
            result: root.join(format!("result_file_{step}")),
            log: root.join(format!("log_file_{step}")),
            error: root.join(format!("error_file_{step}")),
            temp: root.join(format!("temp_file_{step}")),
        }
    }
}

/// Ephemeral directory owned by one pipeline.
///
/// Named `structpipe_<host>_<pid>_<random>` so pipelines on different hosts
/// sharing a filesystem never collide.
#[derive(Debug)]
pub struct WorkingDirectory {
    root: PathBuf,
}

impl WorkingDirectory {
    /// Create a fresh directory under `work_root`.
    pub fn allocate(work_root: &Path) -> Result<Self> {
        let root = work_root.join(unique_name());
        fs::create_dir_all(&root)?;
        info!(path = ?root, "allocated working directory");
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn step(&self, step: usize) -> StepPaths {
        StepPaths::new(&self.root, step)
    }

    /// Recursively delete the directory. Errors are logged and swallowed.
    pub fn remove(&self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(path = ?self.root, "removed working directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?self.root, error = %e, "failed to remove working directory"),
        }
    }
}

fn unique_name() -> String {
    let host = nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map(|h| sanitize(&h))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    let suffix = uuid::Uuid::new_v4().simple().to_string();

    format!("structpipe_{host}_{}_{}", std::process::id(), &suffix[..8])
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
