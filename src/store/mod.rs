//! Persistence abstraction: a job/batch store trait so the worker fleet
//! and HTTP surface can be tested against an in-memory double without a
//! live Postgres instance.

pub mod memory;
pub mod postgres;

use crate::model::{Batch, Job, JobFilter, JobSort, JobStatus, NewBatch, NewJob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::InMemoryJobStore;
pub use postgres::PgJobStore;

/// Result of a stall sweep: how many PROCESSING jobs were force-failed for
/// exceeding the configured max processing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalledReset {
	pub reset_count: u64,
}

/// Jobs and batches, claimed and updated atomically. Implementors must
/// guarantee that `claim_pending` never hands the same job to two callers
/// and that `update_job_status` only ever moves a job forward along
/// PENDING -> PROCESSING -> {COMPLETED, FAILED}.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
	async fn create_job(&self, new_job: NewJob) -> anyhow::Result<Job>;

	async fn create_batch(&self, new_batch: NewBatch) -> anyhow::Result<Batch>;

	async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<Job>>;

	async fn get_batch(&self, batch_id: &str) -> anyhow::Result<Option<Batch>>;

	async fn list_jobs(
		&self,
		filter: JobFilter,
		sort: JobSort,
		skip: i64,
		limit: i64,
	) -> anyhow::Result<Vec<Job>>;

	async fn count_jobs(&self, filter: JobFilter) -> anyhow::Result<i64>;

	/// Atomically claim up to `limit` PENDING jobs, marking them PROCESSING
	/// and stamping `processing_started_at`. Returns the claimed jobs in
	/// FIFO (`created_at` ascending) order.
	async fn claim_pending(&self, limit: i64) -> anyhow::Result<Vec<Job>>;

	/// Update status/progress/results/error on a job. When the update
	/// transitions the job into a terminal state and the job has a
	/// `batch_id`, the store triggers `aggregate_batch` itself — callers
	/// never need to separately aggregate after a terminal update.
	#[allow(clippy::too_many_arguments)]
	async fn update_job_status(
		&self,
		job_id: &str,
		status: JobStatus,
		progress: Option<crate::model::JobProgress>,
		results: Option<crate::model::JobResults>,
		error: Option<crate::model::JobError>,
	) -> anyhow::Result<()>;

	/// Append a log entry, coercing an invalid `level` to `info`.
	async fn append_log(&self, job_id: &str, level: &str, message: &str) -> anyhow::Result<()>;

	/// Recompute a batch's completed/failed/pending/processing counters and
	/// mark it COMPLETED once `completed + failed >= total_jobs`.
	async fn aggregate_batch(&self, batch_id: &str) -> anyhow::Result<()>;

	/// Force-fail PROCESSING jobs whose `processing_started_at` is older than
	/// `cutoff`, stamping a `PROCESSING_TIMEOUT` error.
	async fn reset_stalled(&self, cutoff: DateTime<Utc>) -> anyhow::Result<StalledReset>;

	/// Set a batch's `archived` flag and refresh `updated_at`. A no-op on an
	/// unknown `batch_id`.
	async fn archive_batch(&self, batch_id: &str) -> anyhow::Result<()>;

	/// Cheap liveness probe for `/health/db`.
	async fn ping(&self) -> anyhow::Result<()>;
}
