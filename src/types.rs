// src/types.rs

use std::fmt;

use serde::Deserialize;

/// Exit code reported for a step that was killed by the local timeout.
///
/// No process can exit with this value: real exit codes are `0..=255`,
/// and signal terminations are reported as `128 + signal`.
pub const TIMEOUT_EXIT_CODE: i32 = i32::MIN;

/// Exit code reported for a step that was rejected before doing anything
/// (unknown operation, nothing staged, invalid parameters).
pub const REJECTED_EXIT_CODE: i32 = -1;

/// Result of running one command, locally or remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process ran to completion with this exit code.
    Code(i32),
    /// The process was killed because it exceeded its timeout.
    TimedOut,
    /// Nothing was executed.
    Rejected,
}

impl ExitOutcome {
    /// Flatten into the integer return-code model.
    pub fn code(&self) -> i32 {
        match self {
            ExitOutcome::Code(c) => *c,
            ExitOutcome::TimedOut => TIMEOUT_EXIT_CODE,
            ExitOutcome::Rejected => REJECTED_EXIT_CODE,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Code(0))
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Code(c) => write!(f, "exit code {c}"),
            ExitOutcome::TimedOut => f.write_str("timed out"),
            ExitOutcome::Rejected => f.write_str("rejected"),
        }
    }
}

/// How an operation is executed.
///
/// - `LocalBinary`: an external executable, always run on this host.
/// - `LocalModule`: an interpreter-hosted tool (e.g. a Python module),
///   always run on this host.
/// - `Remote`: may be shipped to the batch scheduler when the pipeline
///   has remote execution enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationFamily {
    LocalBinary,
    LocalModule,
    Remote,
}

impl OperationFamily {
    pub fn remote_eligible(&self) -> bool {
        matches!(self, OperationFamily::Remote)
    }
}

/// Kind of a value in an [`InputParameterSet`](crate::pipeline::InputParameterSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamKind {
    /// Plain string passed through to the command.
    #[default]
    Param,
    /// Path to a file that must exist when the step runs.
    File,
}
