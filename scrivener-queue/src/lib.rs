#![doc = include_str!("../README.md")]

pub mod core;

/// Background worker loop and the batch dispatcher it shares with the
/// foreground drain.
#[cfg(feature = "worker")]
pub mod worker {
    pub mod dispatch;
    pub mod runner;
}

/// Queue facade composing the stores and the worker.
#[cfg(feature = "worker")]
pub mod service;

/// Re-exports to simplify importing this crate types.
pub mod prelude {
    pub use super::core::{
        config::{ConfigError, QueueConfig, RetryPolicy},
        context::{self, CallContext},
        executor::{JobExecutor, JobFailure},
        job::{DeadLetterJob, Job, JobStatus},
        stats::{CapacityPressure, QueueStats},
        store::{DeadLetterStore, JobStore, QueueError},
        new_xid, DateTime, Utc, Xid,
    };
    #[cfg(feature = "worker")]
    pub use super::service::QueueService;
    #[cfg(feature = "worker")]
    pub use super::worker::{
        dispatch::{BatchOutcome, JobDispatcher},
        runner::{QueueWorker, WorkerState},
    };
}
