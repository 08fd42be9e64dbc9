use super::dispatch::JobDispatcher;
use crate::core::config::QueueConfig;
use crate::core::store::JobStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    StopRequested,
    Stopped,
}

struct RunningWorker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the processing loop: fetch a batch, dispatch it, settle every job,
/// repeat. Suspends on an empty queue (timer or enqueue wake, never a busy
/// poll) and during shutdown finishes the batch in flight before exiting.
///
/// `start` and `stop` are idempotent; a stopped worker can be started again.
pub struct QueueWorker<S> {
    dispatcher: JobDispatcher<S>,
    store: S,
    batch_size: usize,
    poll_interval: Duration,
    shutdown_timeout: Duration,
    notify: Arc<Notify>,
    state: Arc<Mutex<WorkerState>>,
    /// Bumped on every `start`. A loop abandoned by a timed-out `stop` keeps
    /// running its batch; the stale generation keeps it from touching the
    /// state of a loop started after it.
    generation: Arc<AtomicU64>,
    running: Mutex<Option<RunningWorker>>,
}

impl<S> QueueWorker<S>
where
    S: JobStore + Clone + Send + Sync + 'static,
{
    pub fn new(dispatcher: JobDispatcher<S>, store: S, config: &QueueConfig) -> Self {
        Self {
            dispatcher,
            store,
            batch_size: config.pool_concurrency,
            poll_interval: config.poll_interval,
            shutdown_timeout: config.shutdown_timeout,
            notify: Arc::new(Notify::new()),
            state: Arc::new(Mutex::new(WorkerState::Idle)),
            generation: Arc::new(AtomicU64::new(0)),
            running: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                return;
            }
        }
        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.lock().await = WorkerState::Running;
        let handle = tokio::spawn(run_loop(
            self.dispatcher.clone(),
            self.store.clone(),
            self.batch_size,
            self.poll_interval,
            self.notify.clone(),
            token.clone(),
            self.state.clone(),
            self.generation.clone(),
            generation,
        ));
        *running = Some(RunningWorker { token, handle });
        tracing::debug!("queue worker started");
    }

    /// Signal the loop to stop after its current batch and wait for it to
    /// confirm exit, up to the configured timeout.
    pub async fn stop(&self) {
        let current = { self.running.lock().await.take() };
        let Some(current) = current else {
            return;
        };
        let stopping = self.generation.load(Ordering::SeqCst);
        *self.state.lock().await = WorkerState::StopRequested;
        current.token.cancel();
        self.notify.notify_one();
        if tokio::time::timeout(self.shutdown_timeout, current.handle)
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                "worker did not confirm exit in time, no longer awaiting its in-flight batch"
            );
        }
        // Skipped if a concurrent start already superseded the stopped loop.
        if self.generation.load(Ordering::SeqCst) == stopping {
            *self.state.lock().await = WorkerState::Stopped;
        }
    }

    /// Interrupt an idle wait. Cheap to call from every enqueue.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.lock().await
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == WorkerState::Running
    }
}

async fn run_loop<S>(
    dispatcher: JobDispatcher<S>,
    store: S,
    batch_size: usize,
    poll_interval: Duration,
    notify: Arc<Notify>,
    token: CancellationToken,
    state: Arc<Mutex<WorkerState>>,
    generation: Arc<AtomicU64>,
    my_generation: u64,
) where
    S: JobStore + Clone + Send + Sync + 'static,
{
    tracing::debug!("worker loop entered");
    while !token.is_cancelled() {
        let batch = match store.get_batch(batch_size).await {
            Ok(batch) => batch,
            Err(error) => {
                tracing::error!(%error, "job store unavailable, stopping worker");
                break;
            }
        };
        if batch.is_empty() {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = notify.notified() => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
            continue;
        }
        match dispatcher.process_batch(batch).await {
            Ok(outcome) => {
                tracing::debug!(
                    succeeded = outcome.succeeded,
                    failed = outcome.failed,
                    "batch processed"
                );
            }
            Err(error) => {
                tracing::error!(%error, "store failure while settling batch, stopping worker");
                break;
            }
        }
    }
    // A loop superseded by a later start must not clobber its successor's
    // state when it finally exits.
    if generation.load(Ordering::SeqCst) == my_generation {
        *state.lock().await = WorkerState::Stopped;
    }
    tracing::debug!("worker loop exited");
}
