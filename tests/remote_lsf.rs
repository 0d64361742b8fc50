mod common;
use crate::common::builders::{OperationBuilder, SiteConfigBuilder};
use crate::common::{FakeScheduler, init_tracing, with_timeout, write_source};

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

use structpipe::config::SchedulerSection;
use structpipe::pipeline::{InputParameterSet, StepPipeline};
use structpipe::scheduler::{BatchSchedulerClient, JobSpec, LsfClient};
use structpipe::types::{ExitOutcome, OperationFamily};

type TestResult = Result<(), Box<dyn Error>>;

/// Stand-in for `bsub -K`.
///
/// Records the `-M` value of every call in `calls` and the other resource
/// flags in `flags`. Requests below 25000 MB are "killed" with an LSF
/// TERM_MEMLIMIT report; larger ones run the command and append a success
/// report. The post-exec hook is always run, like LSF does.
const FAKE_BSUB: &str = r#"#!/bin/sh
dir=$(dirname "$0")
while [ $# -gt 0 ]; do
  case "$1" in
    -J) name="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    -e) err="$2"; shift 2 ;;
    -Ep) hook="$2"; shift 2 ;;
    -M) mem="$2"; shift 2 ;;
    -K) cmd="$2"; shift 2 ;;
    -n|-W|-q|-g|-R|-P) echo "$1 $2" >> "$dir/flags"; shift 2 ;;
    *) shift ;;
  esac
done
echo "$mem" >> "$dir/calls"
if [ "$mem" -lt 25000 ]; then
  printf 'TERM_MEMLIMIT: job killed after reaching LSF memory usage limit.\nExited with exit code 130.\n\nResource usage summary:\n\n    Max Memory :   %s MB\n' "$mem" > "$out"
  : > "$err"
  sh -c "$hook"
  exit 130
fi
sh -c "$cmd" > "$out" 2> "$err"
rc=$?
printf '\nSuccessfully completed.\n\nResource usage summary:\n\n    CPU time :   1.00 sec.\n    Max Memory :   42 MB\n    Average Memory :   40.00 MB\n    Max Processes :   2\n    Max Threads :   3\n    Run time :   2 sec.\n' >> "$out"
sh -c "$hook"
exit $rc
"#;

/// Stand-in that fails with a transient code until it has been called
/// `FLAKY_SUCCEED_AT` times.
const FLAKY_BSUB: &str = r#"#!/bin/sh
dir=$(dirname "$0")
echo x >> "$dir/calls"
n=$(($(wc -l < "$dir/calls")))
if [ "$n" -lt "$FLAKY_SUCCEED_AT" ]; then
  echo "Request from non-LSF host rejected" >&2
  exit 255
fi
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -Ep) hook="$2"; shift 2 ;;
    -K) cmd="$2"; shift 2 ;;
    *) shift ;;
  esac
done
sh -c "$cmd" > "$out"
echo "Successfully completed." >> "$out"
sh -c "$hook"
exit 0
"#;

fn install(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, script).expect("write fake bsub");
    path
}

fn calls(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("calls"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn settings(bsub: &Path) -> SchedulerSection {
    SchedulerSection {
        // Run through `sh` so the script needs no exec bit.
        submit_binary: format!("sh {}", bsub.display()),
        queue: Some("research".to_string()),
        job_group: Some("/structpipe/test".to_string()),
        default_memory_mb: 4000,
        poll_interval_secs: 1,
        completion_timeout_secs: 2,
        submit_retry_delay_secs: 0,
        ..SchedulerSection::default()
    }
}

fn spec(log_dir: &Path, command: &str, memory_mb: u64) -> JobSpec {
    JobSpec {
        command: command.to_string(),
        job_name: "validate_1".to_string(),
        log_dir: log_dir.to_path_buf(),
        timeout_secs: Some(600),
        num_processors: 2,
        memory_limit_mb: memory_mb,
    }
}

#[tokio::test]
async fn oom_kills_escalate_memory_until_the_job_fits() -> TestResult {
    init_tracing();
    let bin = tempdir()?;
    let logs = tempdir()?;
    let bsub = install(bin.path(), "bsub", FAKE_BSUB);

    let client = LsfClient::new(settings(&bsub));
    let done = with_timeout(client.submit_and_wait(spec(logs.path(), "echo validated", 4000))).await?;

    assert_eq!(done.outcome, ExitOutcome::Code(0));
    assert_eq!(done.memory_history, vec![4000, 14_000, 24_000, 54_000]);
    assert_eq!(calls(bin.path()), ["4000", "14000", "24000", "54000"]);
    assert!(done.memory_history.windows(2).all(|w| w[0] <= w[1]));

    assert_eq!(done.job.attempt, 4);
    assert!(!done.job.oom_killed());
    assert_eq!(done.job.usage.max_memory_mb, Some(42.0));
    assert_eq!(done.job.usage.avg_memory_mb, Some(40.0));
    assert_eq!(done.job.usage.cpu_time_secs, Some(1.0));
    assert_eq!(done.job.usage.wall_time_secs, Some(2.0));
    assert_eq!(done.job.usage.max_threads, Some(3));
    assert_eq!(done.job.usage.max_processes, Some(2));
    assert!(done.stdout.starts_with("validated\n"));

    let flags = fs::read_to_string(bin.path().join("flags"))?;
    assert!(flags.contains("-q research"));
    assert!(flags.contains("-g /structpipe/test"));
    assert!(flags.contains("-n 2"));
    assert!(flags.contains("-W 10"));
    assert!(flags.contains("-R rusage[mem=54000]"));
    assert!(!flags.contains("-P "));

    assert!(logs.path().join("validate_1.a4.done").exists());
    Ok(())
}

#[tokio::test]
async fn oom_retries_stop_at_the_configured_cap() -> TestResult {
    init_tracing();
    let bin = tempdir()?;
    let logs = tempdir()?;
    let bsub = install(bin.path(), "bsub", FAKE_BSUB);

    let client = LsfClient::new(SchedulerSection {
        max_oom_attempts: 2,
        ..settings(&bsub)
    });
    let done = with_timeout(client.submit_and_wait(spec(logs.path(), "true", 4000))).await?;

    assert_eq!(done.outcome, ExitOutcome::Code(130));
    assert!(done.job.oom_killed());
    assert_eq!(done.job.attempt, 2);
    assert_eq!(done.memory_history, vec![4000, 14_000]);
    assert_eq!(calls(bin.path()).len(), 2);
    Ok(())
}

#[tokio::test]
async fn large_requests_carry_the_large_memory_class() -> TestResult {
    init_tracing();
    let bin = tempdir()?;
    let logs = tempdir()?;
    let bsub = install(bin.path(), "bsub", FAKE_BSUB);

    let client = LsfClient::new(SchedulerSection {
        large_memory_threshold_mb: 50_000,
        ..settings(&bsub)
    });
    let done = with_timeout(client.submit_and_wait(spec(logs.path(), "true", 60_000))).await?;

    assert!(done.outcome.success());
    let flags = fs::read_to_string(bin.path().join("flags"))?;
    assert!(flags.contains("-P bigmem"));
    Ok(())
}

#[tokio::test]
async fn transient_submit_failures_are_retried() -> TestResult {
    init_tracing();
    let bin = tempdir()?;
    let logs = tempdir()?;
    let bsub = install(bin.path(), "bsub", FLAKY_BSUB);

    let client = LsfClient::new(SchedulerSection {
        submit_binary: format!("FLAKY_SUCCEED_AT=3 sh {}", bsub.display()),
        ..settings(&bsub)
    });
    let done = with_timeout(client.submit_and_wait(spec(logs.path(), "echo ok", 4000))).await?;

    assert_eq!(done.outcome, ExitOutcome::Code(0));
    assert_eq!(calls(bin.path()).len(), 3);
    assert_eq!(done.job.attempt, 1);
    Ok(())
}

#[tokio::test]
async fn transient_failures_surface_after_the_cap() -> TestResult {
    init_tracing();
    let bin = tempdir()?;
    let logs = tempdir()?;
    let bsub = install(bin.path(), "bsub", FLAKY_BSUB);

    let client = LsfClient::new(SchedulerSection {
        submit_binary: format!("FLAKY_SUCCEED_AT=100 sh {}", bsub.display()),
        submit_max_attempts: 3,
        ..settings(&bsub)
    });
    let done = with_timeout(client.submit_and_wait(spec(logs.path(), "echo ok", 4000))).await?;

    assert_eq!(done.outcome, ExitOutcome::Code(255));
    assert_eq!(calls(bin.path()).len(), 3);
    assert!(done.stderr.contains("rejected"));
    Ok(())
}

#[tokio::test]
async fn remote_step_runs_through_lsf_and_chains_locally() -> TestResult {
    init_tracing();
    let bin = tempdir()?;
    let work = tempdir()?;
    let bsub = install(bin.path(), "bsub", FAKE_BSUB);
    let source = write_source(work.path(), "a.cif", "data_1abc\n");

    let cfg = SiteConfigBuilder::new()
        .work_root(work.path())
        .run_remote(true)
        .queue("research")
        .scheduler(|s| {
            s.submit_binary = format!("sh {}", bsub.display());
            s.default_memory_mb = 30_000;
            s.poll_interval_secs = 1;
            s.completion_timeout_secs = 2;
        })
        .with_operation(
            "upper",
            OperationBuilder::new("tr a-z A-Z < {input} > {result}")
                .family(OperationFamily::Remote)
                .build(),
        )
        .with_operation("copy", OperationBuilder::new("cp {input} {result}").build())
        .build();

    let mut pipeline = StepPipeline::from_config(&cfg);
    let params = InputParameterSet::new();
    assert!(pipeline.import(&source));
    assert_eq!(with_timeout(pipeline.invoke("upper", &params)).await, ExitOutcome::Code(0));
    assert_eq!(pipeline.invoke("copy", &params).await, ExitOutcome::Code(0));

    let records = pipeline.records();
    assert!(records[0].remote);
    assert!(!records[1].remote);

    let out = work.path().join("out.cif");
    assert!(pipeline.export(&out));
    assert_eq!(fs::read_to_string(&out)?, "DATA_1ABC\n");

    let log = fs::read_to_string(&records[0].paths.log)?;
    assert!(log.contains("Remote job upper_1: attempts=1 memory_limit_mb=30000"));
    assert_eq!(calls(bin.path()), ["30000"]);

    pipeline.cleanup();
    Ok(())
}

#[tokio::test]
async fn remote_flag_only_applies_to_remote_family() -> TestResult {
    init_tracing();
    let work = tempdir()?;
    let source = write_source(work.path(), "a.cif", "x\n");

    let cfg = SiteConfigBuilder::new()
        .work_root(work.path())
        .run_remote(true)
        .queue("research")
        .with_operation(
            "validate",
            OperationBuilder::new("cp {input} {result}")
                .family(OperationFamily::Remote)
                .memory_mb(8000)
                .processors(4)
                .timeout_secs(120)
                .build(),
        )
        .with_operation(
            "module",
            OperationBuilder::new("cp {input} {result}")
                .family(OperationFamily::LocalModule)
                .build(),
        )
        .build();

    let scheduler = FakeScheduler::new();
    let submitted = scheduler.submitted();
    let mut pipeline = StepPipeline::new(&cfg, scheduler);
    let params = InputParameterSet::new();

    assert!(pipeline.import(&source));
    assert!(pipeline.invoke("module", &params).await.success());
    assert!(pipeline.invoke("validate", &params).await.success());

    let jobs = submitted.lock().unwrap().clone();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_name, "validate_2");
    assert_eq!(jobs[0].memory_limit_mb, 8000);
    assert_eq!(jobs[0].num_processors, 4);
    assert_eq!(jobs[0].timeout_secs, Some(120));
    assert_eq!(Some(jobs[0].log_dir.as_path()), pipeline.workdir());

    pipeline.cleanup();
    Ok(())
}

#[tokio::test]
async fn remote_step_without_a_queue_is_rejected_before_any_file_io() -> TestResult {
    init_tracing();
    let work = tempdir()?;
    let source = write_source(work.path(), "a.cif", "x\n");

    let cfg = SiteConfigBuilder::new()
        .work_root(work.path())
        .with_operation(
            "validate",
            OperationBuilder::new("cp {input} {result}")
                .family(OperationFamily::Remote)
                .build(),
        )
        .build();
    assert!(cfg.scheduler.queue.is_none());

    let mut pipeline = StepPipeline::from_config(&cfg);
    pipeline.set_run_remote(true);
    let params = InputParameterSet::new();

    assert!(pipeline.import(&source));
    assert_eq!(pipeline.invoke("validate", &params).await, ExitOutcome::Rejected);
    assert_eq!(pipeline.current_step(), 0);
    assert!(pipeline.records().is_empty());

    let workdir = pipeline.workdir().unwrap();
    assert!(!workdir.join("log_file_1").exists());
    assert!(!workdir.join("validate_1.a1.out").exists());

    // Without remote mode the same operation runs locally.
    pipeline.set_run_remote(false);
    assert!(pipeline.invoke("validate", &params).await.success());
    assert_eq!(pipeline.current_step(), 1);

    pipeline.cleanup();
    Ok(())
}

#[tokio::test]
async fn leftovers_from_an_earlier_submission_are_ignored() -> TestResult {
    init_tracing();
    let bin = tempdir()?;
    let logs = tempdir()?;
    let bsub = install(bin.path(), "bsub", FAKE_BSUB);

    // Same job name and attempt as a previous session's OOM-killed run.
    fs::write(
        logs.path().join("validate_1.a1.out"),
        "TERM_MEMLIMIT: job killed after reaching LSF memory usage limit.\n\
         Resource usage summary:\n    Max Memory :   4000 MB\n",
    )?;
    fs::write(logs.path().join("validate_1.a1.done"), "")?;

    let client = LsfClient::new(settings(&bsub));
    let done = with_timeout(client.submit_and_wait(spec(logs.path(), "echo fresh", 30_000))).await?;

    assert_eq!(done.outcome, ExitOutcome::Code(0));
    assert!(!done.job.oom_killed());
    assert_eq!(done.memory_history, vec![30_000]);
    assert!(done.stdout.starts_with("fresh\n"));
    assert!(!done.stdout.contains("TERM_MEMLIMIT"));
    Ok(())
}
