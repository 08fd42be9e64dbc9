use scrivener_queue::core::job::{DeadLetterJob, Job, JobStatus};
use scrivener_queue::core::{DateTime, Xid};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Error, FromRow, Row};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub(crate) struct JobRow {
    pub jid: Xid,
    pub job_type: String,
    pub payload: Value,
    pub parallel: bool,
    pub attempts: u32,
    pub created_at: DateTime,
    pub visible_at: DateTime,
    pub started_at: Option<DateTime>,
}

impl<'r> FromRow<'r, SqliteRow> for JobRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, Error> {
        let jid = row
            .try_get("jid")
            .map(Xid::from_str)?
            .map_err(|xid_err| Error::Decode(Box::new(xid_err)))?;
        let job_type = row.try_get("job_type")?;
        let payload = row
            .try_get::<&str, _>("payload")
            .and_then(|raw| serde_json::from_str(raw).map_err(|e| Error::Decode(Box::new(e))))?;
        let parallel = row.try_get("parallel")?;
        let attempts = row.try_get("attempts")?;
        let created_at = row.try_get("created_at")?;
        let visible_at = row.try_get("visible_at")?;
        let started_at = row.try_get("started_at")?;
        Ok(Self {
            jid,
            job_type,
            payload,
            parallel,
            attempts,
            created_at,
            visible_at,
            started_at,
        })
    }
}

impl JobRow {
    pub(crate) fn into_job(self) -> Job {
        let status = if self.started_at.is_some() {
            JobStatus::Processing
        } else if self.attempts > 0 {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        };
        Job {
            id: self.jid,
            job_type: self.job_type,
            payload: self.payload,
            parallel: self.parallel,
            status,
            attempts: self.attempts,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DeadLetterRow {
    pub jid: Xid,
    pub job_type: String,
    pub payload: Value,
    pub parallel: bool,
    pub attempts: u32,
    pub created_at: DateTime,
    pub failed_at: DateTime,
    pub final_error: String,
}

impl<'r> FromRow<'r, SqliteRow> for DeadLetterRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, Error> {
        let jid = row
            .try_get("jid")
            .map(Xid::from_str)?
            .map_err(|xid_err| Error::Decode(Box::new(xid_err)))?;
        let job_type = row.try_get("job_type")?;
        let payload = row
            .try_get::<&str, _>("payload")
            .and_then(|raw| serde_json::from_str(raw).map_err(|e| Error::Decode(Box::new(e))))?;
        let parallel = row.try_get("parallel")?;
        let attempts = row.try_get("attempts")?;
        let created_at = row.try_get("created_at")?;
        let failed_at = row.try_get("failed_at")?;
        let final_error = row.try_get("final_error")?;
        Ok(Self {
            jid,
            job_type,
            payload,
            parallel,
            attempts,
            created_at,
            failed_at,
            final_error,
        })
    }
}

impl DeadLetterRow {
    pub(crate) fn into_dead_letter(self) -> DeadLetterJob {
        DeadLetterJob {
            id: self.jid,
            job_type: self.job_type,
            payload: self.payload,
            parallel: self.parallel,
            attempts: self.attempts,
            created_at: self.created_at,
            failed_at: self.failed_at,
            final_error: self.final_error,
        }
    }
}
