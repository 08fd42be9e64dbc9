use crate::core::config::{ConfigError, QueueConfig, RetryPolicy};
use crate::core::context::{self, CallContext};
use crate::core::executor::JobExecutor;
use crate::core::job::DeadLetterJob;
use crate::core::stats::QueueStats;
use crate::core::store::{DeadLetterStore, JobStore, QueueError};
use crate::core::Xid;
use crate::worker::dispatch::JobDispatcher;
use crate::worker::runner::{QueueWorker, WorkerState};
use serde_json::Value;
use std::sync::Arc;

/// Public face of the queue: an explicit service handle owning the stores and
/// the worker, injected wherever needed. Construct one per queue; dropping it
/// does not lose durable work.
pub struct QueueService<S> {
    store: S,
    config: QueueConfig,
    context: CallContext,
    dispatcher: JobDispatcher<S>,
    worker: QueueWorker<S>,
}

impl<S> QueueService<S>
where
    S: JobStore + DeadLetterStore + Clone + Send + Sync + 'static,
{
    /// Validates the configuration before any work is accepted.
    pub fn new(
        store: S,
        executor: Arc<dyn JobExecutor>,
        config: QueueConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let dispatcher = JobDispatcher::new(
            store.clone(),
            executor,
            RetryPolicy::from_config(&config),
            config.pool_concurrency,
        );
        let worker = QueueWorker::new(dispatcher.clone(), store.clone(), &config);
        Ok(Self {
            store,
            context: context::detect(),
            config,
            dispatcher,
            worker,
        })
    }

    /// Override the detected calling context. Mostly useful in tests.
    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    /// Enqueue a job and return immediately. Silent when the calling context
    /// is automated; a human at a terminal gets a one-line confirmation.
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        parallel: bool,
    ) -> Result<Xid, QueueError> {
        let jid = self.store.enqueue(job_type, payload, parallel).await?;
        self.worker.wake();
        if self.context.is_interactive() {
            println!("queued {job_type} job {jid}");
        }
        Ok(jid)
    }

    /// Aggregate view over both stores.
    pub async fn status(&self) -> Result<QueueStats, QueueError> {
        Ok(QueueStats {
            pending_count: self.store.pending_count().await?,
            processing_count: self.store.processing_count().await?,
            dead_letter_count: self.store.count().await?,
            max_size: self.config.max_size,
        })
    }

    /// Synchronous single-pass drain of everything currently available, for
    /// when no background worker is running. Jobs entering retry backoff
    /// during the drain are left for later. Returns
    /// `(success_count, failure_count)`.
    pub async fn process_queue(&self) -> Result<(usize, usize), QueueError> {
        let mut succeeded = 0;
        let mut failed = 0;
        loop {
            let batch = self.store.get_batch(self.config.pool_concurrency).await?;
            if batch.is_empty() {
                break;
            }
            let outcome = self.dispatcher.process_batch(batch).await?;
            succeeded += outcome.succeeded;
            failed += outcome.failed;
        }
        Ok((succeeded, failed))
    }

    pub async fn start_worker(&self) {
        self.worker.start().await;
    }

    pub async fn stop_worker(&self) {
        self.worker.stop().await;
    }

    /// Conditional eager startup for host-process boot: start the worker only
    /// when a backlog already exists. Returns whether it was started.
    pub async fn start_worker_if_backlog(&self) -> Result<bool, QueueError> {
        if self.store.pending_count().await? > 0 {
            self.worker.start().await;
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn worker_state(&self) -> WorkerState {
        self.worker.state().await
    }

    pub async fn dead_letters(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DeadLetterJob>, QueueError> {
        self.store.list(limit, offset).await
    }

    /// Move one dead letter back to pending with a reset attempt count.
    pub async fn retry_dead_letter(&self, job_id: Xid) -> Result<Xid, QueueError> {
        let jid = self.store.retry(job_id).await?;
        self.worker.wake();
        Ok(jid)
    }

    /// Move every dead letter back to pending. Returns how many were moved.
    pub async fn retry_all_dead_letters(&self) -> Result<usize, QueueError> {
        let moved = self.store.retry_all().await?;
        if moved > 0 {
            self.worker.wake();
        }
        Ok(moved)
    }

    pub async fn delete_dead_letter(&self, job_id: Xid) -> Result<(), QueueError> {
        self.store.delete(job_id).await
    }
}
