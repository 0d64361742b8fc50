#![allow(dead_code)]

pub use structpipe_test_utils::builders;
pub use structpipe_test_utils::fake_scheduler::FakeScheduler;
pub use structpipe_test_utils::{init_tracing, with_timeout};

use std::path::{Path, PathBuf};

use structpipe::config::SiteConfig;
use structpipe::pipeline::StepPipeline;

use crate::common::builders::{OperationBuilder, SiteConfigBuilder};

/// Site config with a handful of small shell operations:
/// - `upper`: uppercase the input
/// - `copy`: copy the input
/// - `tag`: copy the input and append `step<n>`
/// - `fail`: write to stderr and exit 3
/// - `split`: write two declared outputs
pub fn shell_ops_config(work_root: &Path) -> SiteConfig {
    SiteConfigBuilder::new()
        .work_root(work_root)
        .with_operation(
            "upper",
            OperationBuilder::new("tr a-z A-Z < {input} > {result}").build(),
        )
        .with_operation("copy", OperationBuilder::new("cp {input} {result}").build())
        .with_operation(
            "tag",
            OperationBuilder::new("cat {input} > {result}; echo step{step} >> {result}").build(),
        )
        .with_operation(
            "fail",
            OperationBuilder::new("echo broken input >&2; exit 3").build(),
        )
        .with_operation(
            "split",
            OperationBuilder::new("head -n 1 {input} > {workdir}/first_{step}; tail -n 1 {input} > {workdir}/last_{step}")
                .output("{workdir}/first_{step}")
                .output("{workdir}/missing_{step}")
                .output("{workdir}/last_{step}")
                .build(),
        )
        .build()
}

pub fn local_pipeline(work_root: &Path) -> StepPipeline<FakeScheduler> {
    StepPipeline::new(&shell_ops_config(work_root), FakeScheduler::new())
}

pub fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write source");
    path
}
