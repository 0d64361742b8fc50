// src/config/validate.rs

use crate::config::model::{RawSiteConfig, SiteConfig};
use crate::errors::{PipelineError, Result};

impl TryFrom<RawSiteConfig> for SiteConfig {
    type Error = PipelineError;

    fn try_from(raw: RawSiteConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(SiteConfig::new_unchecked(raw.pipeline, raw.scheduler, raw.operation))
    }
}

fn validate_raw_config(cfg: &RawSiteConfig) -> Result<()> {
    ensure_has_operations(cfg)?;
    validate_scheduler(cfg)?;
    validate_operations(cfg)?;
    Ok(())
}

fn ensure_has_operations(cfg: &RawSiteConfig) -> Result<()> {
    if cfg.operation.is_empty() {
        return Err(PipelineError::ConfigError(
            "config must contain at least one [operation.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_scheduler(cfg: &RawSiteConfig) -> Result<()> {
    let s = &cfg.scheduler;

    let positive = [
        ("poll_interval_secs", s.poll_interval_secs),
        ("default_memory_mb", s.default_memory_mb),
        ("wall_time_minutes", s.wall_time_minutes),
        ("submit_max_attempts", u64::from(s.submit_max_attempts)),
        ("max_oom_attempts", u64::from(s.max_oom_attempts)),
        ("default_processors", u64::from(s.default_processors)),
    ];
    for (key, value) in positive {
        if value == 0 {
            return Err(PipelineError::ConfigError(format!(
                "[scheduler].{key} must be >= 1 (got 0)"
            )));
        }
    }

    if s.submit_binary.trim().is_empty() {
        return Err(PipelineError::ConfigError(
            "[scheduler].submit_binary must not be empty".to_string(),
        ));
    }

    // A remote-enabled site with no queue can never submit anything.
    if cfg.pipeline.run_remote && s.queue.as_deref().is_none_or(|q| q.trim().is_empty()) {
        return Err(PipelineError::ConfigError(
            "[scheduler].queue is required when [pipeline].run_remote = true".to_string(),
        ));
    }

    Ok(())
}

fn validate_operations(cfg: &RawSiteConfig) -> Result<()> {
    for (name, op) in cfg.operation.iter() {
        if op.cmd.trim().is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "operation '{name}' has an empty `cmd`"
            )));
        }
        if op.outputs.iter().any(|o| o.trim().is_empty()) {
            return Err(PipelineError::ConfigError(format!(
                "operation '{name}' has an empty entry in `outputs`"
            )));
        }
        if op.timeout_secs == Some(0) {
            return Err(PipelineError::ConfigError(format!(
                "operation '{name}' has timeout_secs = 0"
            )));
        }
        if op.memory_mb == Some(0) || op.processors == Some(0) {
            return Err(PipelineError::ConfigError(format!(
                "operation '{name}' requests zero memory or processors"
            )));
        }
    }
    Ok(())
}
