use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use structpipe::errors::Result;
use structpipe::exec::ProcessRunner;
use structpipe::scheduler::{BatchSchedulerClient, JobOutcome, JobSpec, RemoteJob, ResourceUsage};

/// A fake scheduler that:
/// - records every submitted `JobSpec`
/// - runs the command on the local host so remote steps still produce files
/// - reports the command's exit code with empty resource usage.
#[derive(Clone, Default)]
pub struct FakeScheduler {
    submitted: Arc<Mutex<Vec<JobSpec>>>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the recorded submissions.
    pub fn submitted(&self) -> Arc<Mutex<Vec<JobSpec>>> {
        Arc::clone(&self.submitted)
    }
}

impl BatchSchedulerClient for FakeScheduler {
    fn submit_and_wait(
        &self,
        spec: JobSpec,
    ) -> Pin<Box<dyn Future<Output = Result<JobOutcome>> + Send + '_>> {
        let submitted = Arc::clone(&self.submitted);

        Box::pin(async move {
            {
                let mut guard = submitted.lock().unwrap();
                guard.push(spec.clone());
            }

            let run = ProcessRunner::new().run(&spec.command).await?;
            let memory = spec.memory_limit_mb;

            let mut job = RemoteJob::new(spec);
            job.usage = ResourceUsage::default();
            job.exit_code = Some(run.outcome.code());

            Ok(JobOutcome {
                job,
                outcome: run.outcome,
                stdout: run.stdout,
                stderr: run.stderr,
                memory_history: vec![memory],
            })
        })
    }
}
