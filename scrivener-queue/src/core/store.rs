use crate::core::job::{DeadLetterJob, Job};
use crate::core::{DateTime, Xid};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Durable FIFO storage of pending jobs with an acknowledgment protocol.
///
/// ### Batching contract
///
/// [`get_batch`](JobStore::get_batch) scans jobs in insertion order. A
/// sequential job at the head is returned as a singleton batch (or an empty
/// batch while it waits out a retry backoff; a barrier blocks everything
/// behind it). A parallel head collects consecutive parallel jobs up to
/// `max_items`, stopping at the first sequential job without including it;
/// that job stays at the front of the queue, never skipped or reordered. A
/// parallel job still waiting out its backoff is skipped without holding up
/// its visible siblings, but a barrier never dispatches ahead of one.
///
/// Delivery is at-least-once: a crash mid-processing leaves the in-flight job
/// retrievable after the store is reopened, and callbacks must tolerate
/// duplicate invocation.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Add a job to the queue. Never rejects work: crossing 80% of the
    /// configured capacity logs a warning and crossing 100% logs an error,
    /// but the job is always accepted.
    async fn enqueue(&self, job_type: &str, payload: Value, parallel: bool)
        -> Result<Xid, QueueError>;

    /// Claim the next batch per the batching contract above. Claimed jobs are
    /// invisible to subsequent calls until nacked or released by a store
    /// reopen.
    async fn get_batch(&self, max_items: usize) -> Result<Vec<Job>, QueueError>;

    /// Permanently remove a completed job. Idempotent.
    async fn ack(&self, job_id: Xid) -> Result<(), QueueError>;

    /// Return a failed job to the queue with its updated attempt count,
    /// invisible until `retry_at`.
    async fn nack(&self, job: &Job, retry_at: DateTime) -> Result<(), QueueError>;

    /// Atomically remove the job from this store and archive it in the dead
    /// letter store with the final failure message.
    async fn move_to_dead_letter(&self, job: &Job, error: &str) -> Result<(), QueueError>;

    /// Jobs waiting to run, including those in retry backoff.
    async fn pending_count(&self) -> Result<u64, QueueError>;

    /// Jobs currently claimed by a batch.
    async fn processing_count(&self) -> Result<u64, QueueError>;
}

/// Archive of permanently failed jobs, kept apart from the main store so
/// archive growth never slows hot-path enqueue/dequeue.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Most recently failed first.
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<DeadLetterJob>, QueueError>;

    async fn get(&self, job_id: Xid) -> Result<Option<DeadLetterJob>, QueueError>;

    async fn delete(&self, job_id: Xid) -> Result<(), QueueError>;

    /// Remove the entry and re-insert it into the main store as a fresh
    /// pending job with `attempts` reset to zero.
    async fn retry(&self, job_id: Xid) -> Result<Xid, QueueError>;

    /// [`retry`](DeadLetterStore::retry) for every archived job. Returns how
    /// many were moved.
    async fn retry_all(&self) -> Result<usize, QueueError>;

    async fn count(&self) -> Result<u64, QueueError>;
}

/// Errors related to queue operation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum QueueError {
    /// Encountered an error when tried to serialize a job payload.
    #[error("Failed to serialize job payload")]
    Payload {
        #[from]
        source: serde_json::Error,
    },
    #[error("Job by that ID does not exist: {0}")]
    JobNotFound(Xid),
    /// The persistence layer itself failed. Fatal to the worker, which stops
    /// loudly rather than run against a store in an unknown state.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
