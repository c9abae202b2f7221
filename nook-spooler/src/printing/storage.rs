//! redb-based durable print job queue
//!
//! Every state transition runs inside one write transaction. redb allows a
//! single writer at a time, so a claim can never hand the same job to two
//! workers.

use super::types::{FailureKind, JobCorrelation, JobStatus, PrintJob, ReceiptData};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Jobs table: key = job_id, value = JSON
const JOBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("print_jobs");

/// Index of claimable jobs: (-priority, created_at, sequence) -> job_id
///
/// Ascending key order is claim order: highest priority first, then oldest.
const PENDING_INDEX_TABLE: TableDefinition<(i64, i64, u64), &str> =
    TableDefinition::new("print_jobs_pending");

/// Counters: name -> value
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("print_jobs_meta");

const NEXT_SEQUENCE_KEY: &str = "next_sequence";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Print job not found: {0}")]
    JobNotFound(String),

    #[error("Print job {id} cannot go from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Durable, priority-ordered print job queue
#[derive(Clone)]
pub struct PrintJobQueue {
    db: Arc<Database>,
}

impl PrintJobQueue {
    /// Open or create database
    pub fn open(path: impl AsRef<Path>) -> QueueResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open in-memory database (tests, previews)
    pub fn open_in_memory() -> QueueResult<Self> {
        let db =
            Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> QueueResult<Self> {
        // Initialize tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(JOBS_TABLE)?;
            let _ = write_txn.open_table(PENDING_INDEX_TABLE)?;
            let _ = write_txn.open_table(META_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Producer ==========

    /// Store a new Pending job. No delivery is attempted.
    pub fn enqueue(
        &self,
        receipt: &ReceiptData,
        correlation: JobCorrelation,
        priority: i32,
    ) -> QueueResult<String> {
        self.enqueue_at(receipt, correlation, priority, now_millis())
    }

    /// [`enqueue`](Self::enqueue) with an explicit creation time (Unix millis)
    pub fn enqueue_at(
        &self,
        receipt: &ReceiptData,
        correlation: JobCorrelation,
        priority: i32,
        created_at: i64,
    ) -> QueueResult<String> {
        let payload = serde_json::to_string(receipt)?;
        let txn = self.db.begin_write()?;

        let sequence = {
            let mut meta = txn.open_table(META_TABLE)?;
            let next = meta.get(NEXT_SEQUENCE_KEY)?.map(|g| g.value()).unwrap_or(0);
            meta.insert(NEXT_SEQUENCE_KEY, next + 1)?;
            next
        };

        let job = PrintJob {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            status: JobStatus::Pending,
            priority,
            sequence,
            created_at,
            updated_at: created_at,
            printed_at: None,
            retry_count: 0,
            error: None,
            failure_kind: None,
            correlation,
        };

        store_job(&txn, &job)?;
        index_pending(&txn, &job)?;
        txn.commit()?;

        tracing::debug!(job_id = %job.id, priority, sequence, "Print job enqueued");
        Ok(job.id)
    }

    // ========== Worker ==========

    /// Claim the most urgent Pending job, moving it to Processing
    pub fn claim_next(&self) -> QueueResult<Option<PrintJob>> {
        let txn = self.db.begin_write()?;

        let claimed = {
            let mut index = txn.open_table(PENDING_INDEX_TABLE)?;
            let head = index
                .first()?
                .map(|(key, id)| (key.value(), id.value().to_string()));
            match head {
                Some((key, id)) => {
                    index.remove(key)?;
                    Some(id)
                }
                None => None,
            }
        };

        let Some(id) = claimed else {
            txn.abort()?;
            return Ok(None);
        };

        let mut job = load_job(&txn, &id)?;
        job.status = JobStatus::Processing;
        job.updated_at = now_millis();
        store_job(&txn, &job)?;
        txn.commit()?;

        Ok(Some(job))
    }

    /// Processing -> Completed
    pub fn complete(&self, id: &str) -> QueueResult<PrintJob> {
        self.transition(id, JobStatus::Processing, JobStatus::Completed, |job, now| {
            job.printed_at = Some(now);
            job.error = None;
            job.failure_kind = None;
        })
    }

    /// Processing -> Failed, counting the failure
    pub fn fail(&self, id: &str, kind: FailureKind, error: &str) -> QueueResult<PrintJob> {
        self.transition(id, JobStatus::Processing, JobStatus::Failed, |job, _| {
            job.retry_count += 1;
            job.error = Some(error.to_string());
            job.failure_kind = Some(kind);
        })
    }

    /// Failed -> Pending (operator action); retry count is kept
    pub fn requeue(&self, id: &str) -> QueueResult<PrintJob> {
        let job = self.transition(id, JobStatus::Failed, JobStatus::Pending, |job, _| {
            job.error = None;
            job.failure_kind = None;
        })?;
        tracing::info!(job_id = %id, retry_count = job.retry_count, "Print job requeued");
        Ok(job)
    }

    /// Requeue Failed jobs that have failed fewer than `max_retries` times
    pub fn requeue_retryable(&self, max_retries: u32) -> QueueResult<usize> {
        self.reset_where(|job| job.status == JobStatus::Failed && job.retry_count < max_retries)
    }

    /// Return Processing jobs left by a stopped worker to Pending
    pub fn recover_in_flight(&self) -> QueueResult<usize> {
        self.reset_where(|job| job.status == JobStatus::Processing)
    }

    // ========== Cleanup ==========

    /// Delete Completed/Failed jobs untouched for longer than `retention`
    pub fn sweep(&self, retention: Duration) -> QueueResult<usize> {
        let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
        self.sweep_before(now_millis().saturating_sub(retention_ms))
    }

    /// Delete Completed/Failed jobs with `updated_at` before `cutoff` (Unix millis)
    pub fn sweep_before(&self, cutoff: i64) -> QueueResult<usize> {
        let txn = self.db.begin_write()?;
        let deleted;
        {
            let mut table = txn.open_table(JOBS_TABLE)?;

            let mut to_delete = Vec::new();
            for result in table.iter()? {
                let (key, guard) = result?;
                let job: PrintJob = serde_json::from_slice(guard.value())?;
                if job.status.is_terminal() && job.updated_at < cutoff {
                    to_delete.push(key.value().to_string());
                }
            }

            for id in &to_delete {
                table.remove(id.as_str())?;
            }
            deleted = to_delete.len();
        }
        txn.commit()?;
        Ok(deleted)
    }

    // ========== Diagnostics ==========

    /// Get a job by ID
    pub fn get(&self, id: &str) -> QueueResult<Option<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS_TABLE)?;

        match table.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Newest jobs first, optionally filtered by status
    pub fn list(&self, status: Option<JobStatus>, limit: usize) -> QueueResult<Vec<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS_TABLE)?;

        let mut jobs: Vec<PrintJob> = Vec::new();
        for result in table.iter()? {
            let (_, guard) = result?;
            let job: PrintJob = serde_json::from_slice(guard.value())?;
            if status.is_none_or(|s| s == job.status) {
                jobs.push(job);
            }
        }

        jobs.sort_by_key(|j| std::cmp::Reverse((j.created_at, j.sequence)));
        jobs.truncate(limit);
        Ok(jobs)
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueResult<QueueStats> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS_TABLE)?;

        let mut stats = QueueStats {
            total: table.len()?,
            ..QueueStats::default()
        };
        for result in table.iter()? {
            let (_, guard) = result?;
            let job: PrintJob = serde_json::from_slice(guard.value())?;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    // ========== Internal ==========

    fn transition(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
        apply: impl FnOnce(&mut PrintJob, i64),
    ) -> QueueResult<PrintJob> {
        let txn = self.db.begin_write()?;
        let mut job = load_job(&txn, id)?;

        if job.status != from {
            return Err(QueueError::InvalidTransition {
                id: id.to_string(),
                from: job.status,
                to,
            });
        }

        let now = now_millis();
        job.status = to;
        job.updated_at = now;
        apply(&mut job, now);

        store_job(&txn, &job)?;
        if to == JobStatus::Pending {
            index_pending(&txn, &job)?;
        }
        txn.commit()?;
        Ok(job)
    }

    /// Move every job matching `pred` back to Pending
    fn reset_where(&self, pred: impl Fn(&PrintJob) -> bool) -> QueueResult<usize> {
        let txn = self.db.begin_write()?;

        let mut matched = Vec::new();
        {
            let table = txn.open_table(JOBS_TABLE)?;
            for result in table.iter()? {
                let (_, guard) = result?;
                let job: PrintJob = serde_json::from_slice(guard.value())?;
                if pred(&job) {
                    matched.push(job);
                }
            }
        }

        let now = now_millis();
        for job in &mut matched {
            job.status = JobStatus::Pending;
            job.updated_at = now;
            job.error = None;
            job.failure_kind = None;
            store_job(&txn, job)?;
            index_pending(&txn, job)?;
        }
        txn.commit()?;

        Ok(matched.len())
    }
}

fn store_job(txn: &WriteTransaction, job: &PrintJob) -> QueueResult<()> {
    let mut table = txn.open_table(JOBS_TABLE)?;
    let value = serde_json::to_vec(job)?;
    table.insert(job.id.as_str(), value.as_slice())?;
    Ok(())
}

fn load_job(txn: &WriteTransaction, id: &str) -> QueueResult<PrintJob> {
    let table = txn.open_table(JOBS_TABLE)?;
    let guard = table
        .get(id)?
        .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
    Ok(serde_json::from_slice(guard.value())?)
}

fn index_pending(txn: &WriteTransaction, job: &PrintJob) -> QueueResult<()> {
    let mut index = txn.open_table(PENDING_INDEX_TABLE)?;
    let key = (-i64::from(job.priority), job.created_at, job.sequence);
    index.insert(key, job.id.as_str())?;
    Ok(())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}
