// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `structpipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "structpipe",
    version,
    about = "Stage a structure file through a chain of external tools.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the site config file (TOML).
    ///
    /// Default: `STRUCTPIPE_CONFIG`, else `structpipe.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// File to import as the first step's input.
    #[arg(long, value_name = "PATH")]
    pub source: Option<PathBuf>,

    /// Operation to invoke; repeat to chain steps in order.
    #[arg(long = "op", value_name = "NAME")]
    pub ops: Vec<String>,

    /// Plain parameter as `name=value`.
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// File parameter as `name=path`; the file must exist.
    #[arg(long = "file-param", value_name = "NAME=PATH", value_parser = parse_key_val)]
    pub file_params: Vec<(String, String)>,

    /// Copy the last step's result here.
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Copy the last step's declared outputs here, by position.
    #[arg(long, value_name = "PATH", value_delimiter = ',')]
    pub export_list: Vec<PathBuf>,

    /// Write every step's log, in order, to this file.
    #[arg(long, value_name = "PATH")]
    pub export_log: Option<PathBuf>,

    /// Submit `remote` operations to the batch scheduler.
    #[arg(long)]
    pub remote: bool,

    /// Include rendered commands in step logs.
    #[arg(long)]
    pub debug: bool,

    /// Leave the working directory in place after the run.
    #[arg(long)]
    pub keep_workdir: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STRUCTPIPE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the operation registry, run nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{s}`"))?;
    if k.is_empty() {
        return Err(format!("empty name in `{s}`"));
    }
    Ok((k.to_string(), v.to_string()))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
