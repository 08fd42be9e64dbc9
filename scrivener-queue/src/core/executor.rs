use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// The seam between the queue and the host application's business logic
/// (capture pipelines, command replay, ...). The queue is agnostic to job
/// semantics and passes the payload through unexamined.
///
/// Delivery is at-least-once: after a crash the same job may be handed to the
/// executor again, so implementations must be idempotent-tolerant.
///
/// ## Example
/// ```rust
/// use scrivener_queue::prelude::{JobExecutor, JobFailure};
/// use async_trait::async_trait;
/// use serde_json::Value;
///
/// struct PrintExecutor;
///
/// #[async_trait]
/// impl JobExecutor for PrintExecutor {
///     async fn execute(&self, job_type: &str, payload: &Value) -> Result<(), JobFailure> {
///         println!("{job_type}: {payload}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job_type: &str, payload: &Value) -> Result<(), JobFailure>;
}

/// Explicit failure outcome of one execution attempt. Carried into the retry
/// decision and, on the final attempt, archived verbatim with the dead letter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct JobFailure {
    reason: String,
}

impl JobFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<anyhow::Error> for JobFailure {
    fn from(error: anyhow::Error) -> Self {
        Self::new(format!("{error:#}"))
    }
}
