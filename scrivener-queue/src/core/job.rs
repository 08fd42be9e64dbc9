use crate::core::{DateTime, Xid};
use serde_json::Value;
use std::fmt;

/// Where a job currently is in its lifecycle. Transitions are monotonic:
/// `Pending → Processing`, then back to `Pending` on a retryable failure
/// (reported as `Failed` once at least one attempt has been burned), or gone
/// entirely on ack, or `Dead` once retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Failed,
    Dead,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Failed => "failed",
            JobStatus::Dead => "dead",
        };
        f.write_str(name)
    }
}

/// A unit of deferred work. The payload is opaque to the queue and passed
/// unexamined to the execution callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Xid,
    pub job_type: String,
    pub payload: Value,
    /// Set once at enqueue time. A sequential (`parallel = false`) job is a
    /// barrier: nothing enqueued after it is dispatched until it has fully
    /// resolved.
    pub parallel: bool,
    pub status: JobStatus,
    /// Failed executions so far. Incremented only when an attempt fails.
    pub attempts: u32,
    /// Establishes FIFO order.
    pub created_at: DateTime,
}

/// A job that permanently failed after exhausting its retry budget. Created
/// only by escalation from the main store, destroyed only by manual retry or
/// explicit pruning.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterJob {
    pub id: Xid,
    pub job_type: String,
    pub payload: Value,
    pub parallel: bool,
    pub attempts: u32,
    pub created_at: DateTime,
    pub failed_at: DateTime,
    pub final_error: String,
}
