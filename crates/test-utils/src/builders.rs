#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use structpipe::config::{
    OperationConfig, PipelineSection, RawSiteConfig, SchedulerSection, SiteConfig,
};
use structpipe::types::OperationFamily;

/// Builder for `SiteConfig` to simplify test setup.
pub struct SiteConfigBuilder {
    config: RawSiteConfig,
}

impl SiteConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawSiteConfig {
                pipeline: PipelineSection::default(),
                scheduler: SchedulerSection::default(),
                operation: BTreeMap::new(),
            },
        }
    }

    pub fn with_operation(mut self, name: &str, op: OperationConfig) -> Self {
        self.config.operation.insert(name.to_string(), op);
        self
    }

    pub fn work_root(mut self, root: &Path) -> Self {
        self.config.pipeline.work_root = Some(root.to_path_buf());
        self
    }

    pub fn run_remote(mut self, val: bool) -> Self {
        self.config.pipeline.run_remote = val;
        self
    }

    pub fn debug(mut self, val: bool) -> Self {
        self.config.pipeline.debug = val;
        self
    }

    pub fn default_timeout(mut self, secs: u64) -> Self {
        self.config.pipeline.timeout_secs = Some(secs);
        self
    }

    pub fn queue(mut self, queue: &str) -> Self {
        self.config.scheduler.queue = Some(queue.to_string());
        self
    }

    pub fn scheduler(mut self, f: impl FnOnce(&mut SchedulerSection)) -> Self {
        f(&mut self.config.scheduler);
        self
    }

    pub fn build(self) -> SiteConfig {
        SiteConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for SiteConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `OperationConfig`.
pub struct OperationBuilder {
    op: OperationConfig,
}

impl OperationBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            op: OperationConfig {
                family: OperationFamily::LocalBinary,
                cmd: cmd.to_string(),
                outputs: vec![],
                required_params: vec![],
                timeout_secs: None,
                memory_mb: None,
                processors: None,
            },
        }
    }

    pub fn family(mut self, family: OperationFamily) -> Self {
        self.op.family = family;
        self
    }

    pub fn output(mut self, template: &str) -> Self {
        self.op.outputs.push(template.to_string());
        self
    }

    pub fn requires(mut self, param: &str) -> Self {
        self.op.required_params.push(param.to_string());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.op.timeout_secs = Some(secs);
        self
    }

    pub fn memory_mb(mut self, mb: u64) -> Self {
        self.op.memory_mb = Some(mb);
        self
    }

    pub fn processors(mut self, n: u32) -> Self {
        self.op.processors = Some(n);
        self
    }

    pub fn build(self) -> OperationConfig {
        self.op
    }
}
