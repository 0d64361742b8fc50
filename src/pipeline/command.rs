// src/pipeline/command.rs

//! Turning an operation into a command line.
//!
//! The pipeline only needs a command string, the files the command is
//! expected to produce, and a few resource hints. How those are derived is
//! up to an [`OperationCommandBuilder`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::errors::{PipelineError, Result};
use crate::pipeline::params::InputParameterSet;
use crate::pipeline::registry::OperationRegistry;
use crate::pipeline::workdir::StepPaths;

/// Everything a builder may reference for one step.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub op: &'a str,
    pub workdir: &'a Path,
    pub paths: &'a StepPaths,
    /// Resolved input: previous result, a reused result, or `input_file_1`.
    pub input: &'a Path,
    pub params: &'a InputParameterSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: String,
    /// Expected outputs, in the order exports will zip them.
    pub result_paths: Vec<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub memory_mb: Option<u64>,
    pub processors: Option<u32>,
}

pub trait OperationCommandBuilder: Send + Sync {
    fn build(&self, ctx: &CommandContext<'_>) -> Result<CommandSpec>;
}

/// Builds commands from the `cmd` / `outputs` templates in the registry.
///
/// Placeholders:
///
/// | placeholder     | value                    |
/// |-----------------|--------------------------|
/// | `{input}`       | resolved step input      |
/// | `{result}`      | `result_file_n`          |
/// | `{log}`         | `log_file_n`             |
/// | `{error}`       | `error_file_n`           |
/// | `{temp}`        | `temp_file_n`            |
/// | `{workdir}`     | working directory        |
/// | `{step}`        | step number              |
/// | `{param:NAME}`  | value of parameter NAME  |
///
/// `{{` and `}}` produce literal braces.
#[derive(Debug, Clone)]
pub struct TemplateCommandBuilder {
    registry: Arc<OperationRegistry>,
}

impl TemplateCommandBuilder {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }
}

impl OperationCommandBuilder for TemplateCommandBuilder {
    fn build(&self, ctx: &CommandContext<'_>) -> Result<CommandSpec> {
        let op = self
            .registry
            .get(ctx.op)
            .ok_or_else(|| PipelineError::UnknownOperation(ctx.op.to_string()))?;

        let command = render(&op.cmd, ctx)?;
        let result_paths = if op.outputs.is_empty() {
            vec![ctx.paths.result.clone()]
        } else {
            op.outputs
                .iter()
                .map(|t| render(t, ctx).map(PathBuf::from))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(CommandSpec {
            command,
            result_paths,
            timeout_secs: op.timeout_secs,
            memory_mb: op.memory_mb,
            processors: op.processors,
        })
    }
}

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([a-z]+)(?::([^{}]+))?\}").expect("static regex")
});

/// Substitute placeholders in `template`.
pub fn render(template: &str, ctx: &CommandContext<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 64);
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        match whole.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            _ => {
                let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let arg = caps.get(2).map(|m| m.as_str());
                out.push_str(&resolve(key, arg, ctx)?);
            }
        }
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn resolve(key: &str, arg: Option<&str>, ctx: &CommandContext<'_>) -> Result<String> {
    let path = |p: &Path| p.to_string_lossy().into_owned();
    let value = match (key, arg) {
        ("input", None) => path(ctx.input),
        ("result", None) => path(&ctx.paths.result),
        ("log", None) => path(&ctx.paths.log),
        ("error", None) => path(&ctx.paths.error),
        ("temp", None) => path(&ctx.paths.temp),
        ("workdir", None) => path(ctx.workdir),
        ("step", None) => ctx.paths.step.to_string(),
        ("param", Some(name)) => ctx
            .params
            .value(name)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::MissingParameter {
                op: ctx.op.to_string(),
                param: name.to_string(),
            })?,
        _ => {
            return Err(PipelineError::ConfigError(format!(
                "operation '{}' uses unknown placeholder '{{{}{}}}'",
                ctx.op,
                key,
                arg.map(|a| format!(":{a}")).unwrap_or_default()
            )));
        }
    };
    Ok(value)
}
