// src/scheduler/usage.rs

//! Parsing of the LSF "Resource usage summary" block.
//!
//! ```text
//! TERM_MEMLIMIT: job killed after reaching LSF memory usage limit.
//! Exited with exit code 130.
//!
//! Resource usage summary:
//!
//!     CPU time :                                   12.40 sec.
//!     Max Memory :                                 4102 MB
//!     Average Memory :                             2876.31 MB
//!     Max Processes :                              3
//!     Max Threads :                                7
//!     Run time :                                   19 sec.
//! ```
//!
//! If a job was resubmitted into the same output file only the last record
//! counts, status line included.

use std::sync::LazyLock;

use regex::Regex;

/// Metrics reported by the scheduler for one finished attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceUsage {
    pub max_memory_mb: Option<f64>,
    pub avg_memory_mb: Option<f64>,
    pub cpu_time_secs: Option<f64>,
    pub wall_time_secs: Option<f64>,
    pub max_threads: Option<u32>,
    pub max_processes: Option<u32>,
    pub oom_killed: bool,
}

impl ResourceUsage {
    /// Peak memory rounded up to whole MB, for the backoff rule.
    pub fn max_memory_ceil_mb(&self) -> Option<u64> {
        self.max_memory_mb.map(|m| m.max(0.0).ceil() as u64)
    }
}

const SUMMARY_HEADER: &str = "Resource usage summary:";

static MAX_MEMORY: LazyLock<Regex> = LazyLock::new(|| memory_regex("Max Memory"));
static AVG_MEMORY: LazyLock<Regex> = LazyLock::new(|| memory_regex("Average Memory"));
static CPU_TIME: LazyLock<Regex> = LazyLock::new(|| seconds_regex("CPU time"));
static RUN_TIME: LazyLock<Regex> = LazyLock::new(|| seconds_regex("Run time"));
static MAX_THREADS: LazyLock<Regex> = LazyLock::new(|| count_regex("Max Threads"));
static MAX_PROCESSES: LazyLock<Regex> = LazyLock::new(|| count_regex("Max Processes"));

fn memory_regex(label: &str) -> Regex {
    Regex::new(&format!(r"(?m)^\s*{label}\s*:\s*([0-9]+(?:\.[0-9]+)?)\s*([KMGT]B)"))
        .expect("static regex")
}

fn seconds_regex(label: &str) -> Regex {
    Regex::new(&format!(r"(?m)^\s*{label}\s*:\s*([0-9]+(?:\.[0-9]+)?)\s*sec")).expect("static regex")
}

fn count_regex(label: &str) -> Regex {
    Regex::new(&format!(r"(?m)^\s*{label}\s*:\s*([0-9]+)\s*$")).expect("static regex")
}

/// Parse the usage summary out of a job's captured output.
///
/// Missing fields (including LSF's `-` placeholder) stay `None`.
pub fn parse_usage(report: &str) -> ResourceUsage {
    let report = last_record(report);
    ResourceUsage {
        max_memory_mb: last_memory(&MAX_MEMORY, report),
        avg_memory_mb: last_memory(&AVG_MEMORY, report),
        cpu_time_secs: last_number(&CPU_TIME, report),
        wall_time_secs: last_number(&RUN_TIME, report),
        max_threads: last_number(&MAX_THREADS, report),
        max_processes: last_number(&MAX_PROCESSES, report),
        oom_killed: report.contains("TERM_MEMLIMIT"),
    }
}

/// Text of the last job record: everything after the second-to-last
/// summary header, so the record's status lines and its own summary are
/// both included.
fn last_record(report: &str) -> &str {
    match report.rmatch_indices(SUMMARY_HEADER).nth(1) {
        Some((at, header)) => &report[at + header.len()..],
        None => report,
    }
}

fn last_number<T: std::str::FromStr>(re: &Regex, report: &str) -> Option<T> {
    re.captures_iter(report)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn last_memory(re: &Regex, report: &str) -> Option<f64> {
    let caps = re.captures_iter(report).last()?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let factor = match caps.get(2)?.as_str() {
        "KB" => 1.0 / 1024.0,
        "MB" => 1.0,
        "GB" => 1024.0,
        "TB" => 1024.0 * 1024.0,
        _ => return None,
    };
    Some(value * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OOM_REPORT: &str = "\
TERM_MEMLIMIT: job killed after reaching LSF memory usage limit.
Exited with exit code 130.

Resource usage summary:

    CPU time :                                   12.40 sec.
    Max Memory :                                 4102 MB
    Average Memory :                             2876.31 MB
    Total Requested Memory :                     4000.00 MB
    Max Swap :                                   -
    Max Processes :                              3
    Max Threads :                                7
    Run time :                                   19 sec.
    Turnaround time :                            25 sec.
";

    #[test]
    fn parses_full_oom_report() {
        let u = parse_usage(OOM_REPORT);
        assert!(u.oom_killed);
        assert_eq!(u.max_memory_mb, Some(4102.0));
        assert_eq!(u.avg_memory_mb, Some(2876.31));
        assert_eq!(u.cpu_time_secs, Some(12.40));
        assert_eq!(u.wall_time_secs, Some(19.0));
        assert_eq!(u.max_processes, Some(3));
        assert_eq!(u.max_threads, Some(7));
        assert_eq!(u.max_memory_ceil_mb(), Some(4102));
    }

    #[test]
    fn converts_units_and_tolerates_placeholders() {
        let u = parse_usage(
            "Successfully completed.\n    Max Memory :   2 GB\n    Average Memory :   -\n    Max Threads :  -\n",
        );
        assert!(!u.oom_killed);
        assert_eq!(u.max_memory_mb, Some(2048.0));
        assert_eq!(u.avg_memory_mb, None);
        assert_eq!(u.max_threads, None);
    }

    #[test]
    fn last_block_wins() {
        let report = "    Max Memory : 10 MB\n...\n    Max Memory : 20 MB\n";
        assert_eq!(parse_usage(report).max_memory_mb, Some(20.0));
    }

    #[test]
    fn earlier_oom_record_does_not_taint_a_later_success() {
        let report = format!(
            "{OOM_REPORT}\nSuccessfully completed.\n\nResource usage summary:\n\n    Max Memory :   42 MB\n"
        );
        let u = parse_usage(&report);
        assert!(!u.oom_killed);
        assert_eq!(u.max_memory_mb, Some(42.0));
    }

    #[test]
    fn later_oom_record_is_flagged() {
        let report = format!(
            "Successfully completed.\n\nResource usage summary:\n\n    Max Memory :   42 MB\n\n{OOM_REPORT}"
        );
        let u = parse_usage(&report);
        assert!(u.oom_killed);
        assert_eq!(u.max_memory_mb, Some(4102.0));
    }

    #[test]
    fn empty_report_is_all_none() {
        assert_eq!(parse_usage(""), ResourceUsage::default());
    }
}
