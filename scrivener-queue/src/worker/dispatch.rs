use crate::core::config::RetryPolicy;
use crate::core::executor::JobExecutor;
use crate::core::job::Job;
use crate::core::store::{JobStore, QueueError};
use crate::core::Utc;
use anyhow::Context;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Per-batch tally. Job failures are counted, never raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs one batch at a time: a lone sequential job inline, a parallel batch
/// across a semaphore-bounded pool. Owns the ack/nack/dead-letter decision for
/// every job it runs, so the background worker and the foreground drain share
/// identical retry behavior.
pub struct JobDispatcher<S> {
    store: S,
    executor: Arc<dyn JobExecutor>,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
}

impl<S: Clone> Clone for JobDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            executor: self.executor.clone(),
            retry: self.retry,
            semaphore: self.semaphore.clone(),
        }
    }
}

impl<S> JobDispatcher<S>
where
    S: JobStore + Clone + Send + Sync + 'static,
{
    pub fn new(
        store: S,
        executor: Arc<dyn JobExecutor>,
        retry: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            executor,
            retry,
            semaphore: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Process a batch to completion. Returns `Err` only on store failure;
    /// one job's failure never aborts or marks failed any sibling.
    pub async fn process_batch(&self, batch: Vec<Job>) -> Result<BatchOutcome, QueueError> {
        if let [job] = batch.as_slice() {
            if !job.parallel {
                // A barrier runs alone and inline; nothing else is in flight.
                let succeeded = self.process_job(job.clone()).await?;
                return Ok(BatchOutcome {
                    succeeded: usize::from(succeeded),
                    failed: usize::from(!succeeded),
                });
            }
        }

        let mut handles = Vec::with_capacity(batch.len());
        for job in batch {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .context("Execution pool semaphore closed")?;
            let dispatcher = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                dispatcher.process_job(job).await
            }));
        }

        let mut outcome = BatchOutcome::default();
        for joined in join_all(handles).await {
            match joined {
                Ok(processed) => {
                    if processed? {
                        outcome.succeeded += 1;
                    } else {
                        outcome.failed += 1;
                    }
                }
                Err(error) => {
                    // The job was neither acked nor nacked; it stays claimed
                    // until the store is reopened.
                    tracing::error!(%error, "job task aborted mid-flight");
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Execute one job and settle it with the store. `Ok(true)` means acked.
    async fn process_job(&self, mut job: Job) -> Result<bool, QueueError> {
        match self.executor.execute(&job.job_type, &job.payload).await {
            Ok(()) => {
                tracing::debug!(jid = %job.id, job_type = %job.job_type, "job completed");
                self.store.ack(job.id).await?;
                Ok(true)
            }
            Err(failure) => {
                job.attempts += 1;
                if self.retry.is_exhausted(job.attempts) {
                    tracing::warn!(
                        jid = %job.id,
                        job_type = %job.job_type,
                        attempts = job.attempts,
                        error = %failure,
                        "retries exhausted, moving job to the dead letter store"
                    );
                    self.store
                        .move_to_dead_letter(&job, failure.reason())
                        .await?;
                } else {
                    let delay = self.retry.delay_for(job.attempts);
                    let retry_at = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 2_000));
                    tracing::warn!(
                        jid = %job.id,
                        job_type = %job.job_type,
                        attempts = job.attempts,
                        error = %failure,
                        delay_ms = delay.as_millis() as u64,
                        "job failed, retry scheduled"
                    );
                    self.store.nack(&job, retry_at).await?;
                }
                Ok(false)
            }
        }
    }
}
