use crate::types::{DeadLetterRow, JobRow};
use anyhow::Context;
use async_trait::async_trait;
use scrivener_queue::core::job::{DeadLetterJob, Job, JobStatus};
use scrivener_queue::core::stats::CapacityPressure;
use scrivener_queue::core::store::{DeadLetterStore, JobStore, QueueError};
use scrivener_queue::core::{new_xid, DateTime, Utc, Xid};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Row, SqlitePool};
use std::collections::HashSet;
use std::path::Path;
use tracing::instrument;

/// Default soft capacity limit of the pending queue.
pub const DEFAULT_MAX_SIZE: usize = 100;

/// SQLite-backed implementation of both store traits. Pending jobs and dead
/// letters live in separate tables of the same database, so cross-store moves
/// are single transactions. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_size: usize,
}

impl SqliteStore {
    /// Wrap an existing pool. The schema is not applied; call
    /// [`apply_schema`](SqliteStore::apply_schema) or use
    /// [`connect`](SqliteStore::connect).
    pub fn with_pool(pool: SqlitePool, max_size: usize) -> Self {
        Self { pool, max_size }
    }

    /// Open (creating if missing) a store at the given path, apply the schema
    /// and release any claims left behind by a previous process.
    pub async fn connect(path: &Path, max_size: usize) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to open the job store")?;
        let store = Self::with_pool(pool, max_size);
        store.apply_schema().await?;
        store.release_stale_claims().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn apply_schema(&self) -> Result<(), QueueError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;
        sqlx::query(crate::SCHEMA_SQL)
            .execute(&mut tx)
            .await
            .context("Failed to apply the job store schema")?;
        tx.commit().await.context("Failed to commit the schema")?;
        Ok(())
    }

    /// Claims only ever belong to the current process, so anything claimed
    /// before this store was opened is an in-flight casualty of a crash or
    /// kill and goes back to pending.
    async fn release_stale_claims(&self) -> Result<(), QueueError> {
        let released =
            sqlx::query("UPDATE sq_queue SET started_at = NULL WHERE started_at IS NOT NULL")
                .execute(&self.pool)
                .await
                .context("Failed to release stale claims")?;
        if released.rows_affected() > 0 {
            tracing::info!(
                count = released.rows_affected(),
                "released in-flight jobs from a previous run"
            );
        }
        Ok(())
    }
}

/// FIFO scan implementing the batching contract: barrier head runs alone
/// (or blocks the queue while in backoff), a parallel run collects visible
/// parallel jobs up to `max_items` and stops at the first barrier, which is
/// left at the front for a later batch.
fn select_batch(pending: &[JobRow], max_items: usize, now: DateTime) -> Vec<JobRow> {
    let Some(head) = pending.first() else {
        return Vec::new();
    };
    if !head.parallel {
        return if head.visible_at <= now {
            vec![head.clone()]
        } else {
            Vec::new()
        };
    }
    let mut batch = Vec::new();
    for row in pending {
        if !row.parallel {
            // Also keeps a barrier from dispatching ahead of an earlier
            // parallel job that is still waiting out its backoff.
            break;
        }
        if row.visible_at <= now {
            batch.push(row.clone());
            if batch.len() == max_items {
                break;
            }
        }
    }
    batch
}

#[async_trait]
impl JobStore for SqliteStore {
    #[instrument(skip(self, payload), err)]
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        parallel: bool,
    ) -> Result<Xid, QueueError> {
        let payload = serde_json::to_string(&payload)?;
        let jid = new_xid();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO sq_queue (jid, job_type, payload, parallel, attempts, created_at, visible_at) \
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
        )
        .bind(jid.to_string())
        .bind(job_type)
        .bind(payload)
        .bind(parallel)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to add job to the queue")?;

        let pending = self.pending_count().await?;
        match CapacityPressure::of(pending, self.max_size) {
            CapacityPressure::Critical => tracing::error!(
                pending,
                max_size = self.max_size,
                "job queue is at or over capacity, accepting the job anyway"
            ),
            CapacityPressure::Warning => tracing::warn!(
                pending,
                max_size = self.max_size,
                "job queue is nearing capacity"
            ),
            CapacityPressure::Normal => {}
        }
        Ok(jid)
    }

    async fn get_batch(&self, max_items: usize) -> Result<Vec<Job>, QueueError> {
        if max_items == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        // Non-destructive peek over the (small, soft-capped) pending set; the
        // scan happens here rather than in SQL so a barrier interrupting a
        // parallel run is left untouched instead of dequeued and nacked.
        let pending: Vec<JobRow> = sqlx::query(
            "SELECT * FROM sq_queue WHERE started_at IS NULL ORDER BY created_at ASC, rowid ASC",
        )
        .try_map(|row| JobRow::from_row(&row))
        .fetch_all(&self.pool)
        .await
        .context("Failed to scan the queue")?;

        let chosen = select_batch(&pending, max_items, now);
        if chosen.is_empty() {
            return Ok(Vec::new());
        }

        // Claim what the scan picked. A concurrent caller may have raced us to
        // some rows; only what this call actually claimed is returned.
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE sq_queue SET started_at=");
        builder.push_bind(now);
        builder.push(" WHERE started_at IS NULL AND jid IN (");
        {
            let mut separated = builder.separated(",");
            for row in &chosen {
                separated.push_bind(row.jid.to_string());
            }
        }
        builder.push(") RETURNING jid");
        let claimed: HashSet<String> = builder
            .build()
            .try_map(|row| row.try_get::<String, _>("jid"))
            .fetch_all(&self.pool)
            .await
            .context("Failed to claim the batch")?
            .into_iter()
            .collect();

        Ok(chosen
            .into_iter()
            .filter(|row| claimed.contains(&row.jid.to_string()))
            .map(|row| {
                let mut job = row.into_job();
                job.status = JobStatus::Processing;
                job
            })
            .collect())
    }

    async fn ack(&self, job_id: Xid) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM sq_queue WHERE jid = ?1")
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to mark job as completed")?;
        Ok(())
    }

    async fn nack(&self, job: &Job, retry_at: DateTime) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE sq_queue SET started_at = NULL, attempts = ?2, visible_at = ?3 WHERE jid = ?1",
        )
        .bind(job.id.to_string())
        .bind(job.attempts)
        .bind(retry_at)
        .execute(&self.pool)
        .await
        .context("Failed to return job to the queue")?;
        Ok(())
    }

    #[instrument(skip(self, job), err, fields(jid = %job.id, job_type = %job.job_type))]
    async fn move_to_dead_letter(&self, job: &Job, error: &str) -> Result<(), QueueError> {
        let jid = job.id.to_string();
        let payload = serde_json::to_string(&job.payload)?;
        let failed_at = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;
        sqlx::query("DELETE FROM sq_queue WHERE jid = ?1")
            .bind(&jid)
            .execute(&mut tx)
            .await
            .context("Failed to delete job from the queue")?;
        sqlx::query(
            "INSERT INTO sq_dead_queue (jid, job_type, payload, parallel, attempts, created_at, failed_at, final_error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&jid)
        .bind(&job.job_type)
        .bind(payload)
        .bind(job.parallel)
        .bind(job.attempts)
        .bind(job.created_at)
        .bind(failed_at)
        .bind(error)
        .execute(&mut tx)
        .await
        .context("Failed to move job to the dead letter store")?;
        tx.commit()
            .await
            .context("Failed to commit the dead letter move")?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sq_queue WHERE started_at IS NULL")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count pending jobs")?;
        Ok(count as u64)
    }

    async fn processing_count(&self) -> Result<u64, QueueError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sq_queue WHERE started_at IS NOT NULL")
                .fetch_one(&self.pool)
                .await
                .context("Failed to count in-flight jobs")?;
        Ok(count as u64)
    }
}

#[async_trait]
impl DeadLetterStore for SqliteStore {
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<DeadLetterJob>, QueueError> {
        let rows: Vec<DeadLetterRow> = sqlx::query(
            "SELECT * FROM sq_dead_queue ORDER BY failed_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .try_map(|row| DeadLetterRow::from_row(&row))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list dead letter jobs")?;
        Ok(rows.into_iter().map(DeadLetterRow::into_dead_letter).collect())
    }

    async fn get(&self, job_id: Xid) -> Result<Option<DeadLetterJob>, QueueError> {
        let row = sqlx::query("SELECT * FROM sq_dead_queue WHERE jid = ?1")
            .bind(job_id.to_string())
            .try_map(|row| DeadLetterRow::from_row(&row))
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up dead letter job")?;
        Ok(row.map(DeadLetterRow::into_dead_letter))
    }

    async fn delete(&self, job_id: Xid) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM sq_dead_queue WHERE jid = ?1")
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete dead letter job")?;
        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }
        Ok(())
    }

    #[instrument(skip(self), err, fields(jid = %job_id))]
    async fn retry(&self, job_id: Xid) -> Result<Xid, QueueError> {
        let jid = job_id.to_string();
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;
        let row: Option<DeadLetterRow> = sqlx::query("SELECT * FROM sq_dead_queue WHERE jid = ?1")
            .bind(&jid)
            .try_map(|row| DeadLetterRow::from_row(&row))
            .fetch_optional(&mut tx)
            .await
            .context("Failed to look up dead letter job")?;
        let Some(row) = row else {
            return Err(QueueError::JobNotFound(job_id));
        };
        sqlx::query("DELETE FROM sq_dead_queue WHERE jid = ?1")
            .bind(&jid)
            .execute(&mut tx)
            .await
            .context("Failed to delete dead letter job")?;
        let payload = serde_json::to_string(&row.payload)?;
        // Fresh pending job: attempts reset, re-enqueued at the tail.
        sqlx::query(
            "INSERT INTO sq_queue (jid, job_type, payload, parallel, attempts, created_at, visible_at) \
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
        )
        .bind(&jid)
        .bind(&row.job_type)
        .bind(payload)
        .bind(row.parallel)
        .bind(now)
        .bind(now)
        .execute(&mut tx)
        .await
        .context("Failed to re-enqueue dead letter job")?;
        tx.commit()
            .await
            .context("Failed to commit the dead letter retry")?;
        Ok(job_id)
    }

    async fn retry_all(&self) -> Result<usize, QueueError> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;
        let moved = sqlx::query(
            "INSERT INTO sq_queue (jid, job_type, payload, parallel, attempts, created_at, visible_at) \
             SELECT jid, job_type, payload, parallel, 0, ?1, ?2 FROM sq_dead_queue",
        )
        .bind(now)
        .bind(now)
        .execute(&mut tx)
        .await
        .context("Failed to re-enqueue dead letter jobs")?;
        sqlx::query("DELETE FROM sq_dead_queue")
            .execute(&mut tx)
            .await
            .context("Failed to clear the dead letter store")?;
        tx.commit()
            .await
            .context("Failed to commit the dead letter retry")?;
        Ok(moved.rows_affected() as usize)
    }

    async fn count(&self) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sq_dead_queue")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count dead letter jobs")?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn row(parallel: bool, offset_ms: i64, backoff_ms: i64) -> JobRow {
        let created_at = Utc::now() + chrono::Duration::milliseconds(offset_ms);
        JobRow {
            jid: new_xid(),
            job_type: "test".into(),
            payload: Value::Null,
            parallel,
            attempts: 0,
            created_at,
            visible_at: Utc::now() + chrono::Duration::milliseconds(backoff_ms),
            started_at: None,
        }
    }

    #[test]
    fn empty_scan_selects_nothing() {
        assert!(select_batch(&[], 10, Utc::now()).is_empty());
    }

    #[test]
    fn barrier_head_is_a_singleton() {
        let rows = vec![row(false, 0, -10), row(true, 1, -10), row(true, 2, -10)];
        let batch = select_batch(&rows, 10, Utc::now());
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].jid, rows[0].jid);
    }

    #[test]
    fn barrier_head_in_backoff_blocks_the_queue() {
        let rows = vec![row(false, 0, 60_000), row(true, 1, -10)];
        assert!(select_batch(&rows, 10, Utc::now()).is_empty());
    }

    #[test]
    fn parallel_run_stops_at_the_barrier() {
        let rows = vec![
            row(true, 0, -10),
            row(true, 1, -10),
            row(false, 2, -10),
            row(true, 3, -10),
        ];
        let batch = select_batch(&rows, 10, Utc::now());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].jid, rows[0].jid);
        assert_eq!(batch[1].jid, rows[1].jid);
    }

    #[test]
    fn parallel_run_respects_max_items() {
        let rows = vec![row(true, 0, -10), row(true, 1, -10), row(true, 2, -10)];
        assert_eq!(select_batch(&rows, 2, Utc::now()).len(), 2);
    }

    #[test]
    fn parallel_job_in_backoff_is_skipped_without_blocking_siblings() {
        let rows = vec![row(true, 0, 60_000), row(true, 1, -10)];
        let batch = select_batch(&rows, 10, Utc::now());
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].jid, rows[1].jid);
    }

    #[test]
    fn barrier_never_dispatches_ahead_of_a_skipped_parallel_job() {
        let rows = vec![row(true, 0, 60_000), row(false, 1, -10)];
        assert!(select_batch(&rows, 10, Utc::now()).is_empty());
    }
}
