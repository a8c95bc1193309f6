//! `sqlx::PgPool`-backed `JobStore`: a thin struct wrapping a pool, an
//! `async_trait` impl doing hand-built SQL rather than an ORM, row shapes
//! decoded through `sqlx::Row` rather than `derive(FromRow)` because several
//! columns are JSONB blobs that need `serde_json` round-tripping.

use super::{JobStore, StalledReset};
use crate::model::{
	AccessControl, Batch, Job, JobError, JobFilter, JobProgress, JobResults, JobSort, JobStatus,
	LogEntry, NewBatch, NewJob,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgJobStore {
	pool: PgPool,
}

impl PgJobStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Connect with a small bounded retry and backoff, so a database that
	/// is still starting up (e.g. in a container) doesn't fail startup
	/// outright.
	pub async fn connect(database_url: &str, retries: u32, backoff_ms: u64) -> Result<Self> {
		let mut attempt = 0;
		loop {
			match PgPoolOptions::new()
				.max_connections(10)
				.connect(database_url)
				.await
			{
				Ok(pool) => return Ok(Self { pool }),
				Err(e) if attempt < retries => {
					attempt += 1;
					log::warn!(
						"job store connect attempt {}/{} failed: {}",
						attempt,
						retries,
						e
					);
					tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
				}
				Err(e) => return Err(e).context("connecting to job store database"),
			}
		}
	}

	/// Create the `jobs`/`batches` tables and their logical indexes if they
	/// do not already exist. Intended for local/dev bootstrap; production
	/// deployments are expected to run migrations out of band.
	pub async fn ensure_schema(&self) -> Result<()> {
		sqlx::query(
			r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                job_type TEXT NOT NULL,
                job_name TEXT,
                status TEXT NOT NULL,
                parameters JSONB NOT NULL DEFAULT '{}',
                progress JSONB,
                results JSONB,
                error JSONB,
                log_entries JSONB NOT NULL DEFAULT '[]',
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                processing_started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                user_id TEXT,
                access_control JSONB,
                batch_id TEXT,
                archived BOOLEAN NOT NULL DEFAULT false
            )
            "#,
		)
		.execute(&self.pool)
		.await?;

		sqlx::query("CREATE INDEX IF NOT EXISTS jobs_status_idx ON jobs (status)")
			.execute(&self.pool)
			.await?;
		sqlx::query("CREATE INDEX IF NOT EXISTS jobs_batch_id_idx ON jobs (batch_id)")
			.execute(&self.pool)
			.await?;
		sqlx::query("CREATE INDEX IF NOT EXISTS jobs_created_at_idx ON jobs (created_at)")
			.execute(&self.pool)
			.await?;
		sqlx::query("CREATE INDEX IF NOT EXISTS jobs_user_id_idx ON jobs (user_id)")
			.execute(&self.pool)
			.await?;
		sqlx::query(
			"CREATE INDEX IF NOT EXISTS jobs_status_processing_started_idx ON jobs (status, processing_started_at)",
		)
		.execute(&self.pool)
		.await?;

		sqlx::query(
			r#"
            CREATE TABLE IF NOT EXISTS batches (
                batch_id TEXT PRIMARY KEY,
                batch_name TEXT,
                status TEXT NOT NULL,
                total_jobs BIGINT NOT NULL,
                completed_jobs BIGINT NOT NULL DEFAULT 0,
                failed_jobs BIGINT NOT NULL DEFAULT 0,
                pending_jobs BIGINT NOT NULL DEFAULT 0,
                processing_jobs BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                user_id TEXT,
                access_control JSONB,
                archived BOOLEAN NOT NULL DEFAULT false,
                is_active BOOLEAN NOT NULL DEFAULT true
            )
            "#,
		)
		.execute(&self.pool)
		.await?;

		sqlx::query("CREATE INDEX IF NOT EXISTS batches_status_idx ON batches (status)")
			.execute(&self.pool)
			.await?;
		sqlx::query("CREATE INDEX IF NOT EXISTS batches_created_at_idx ON batches (created_at)")
			.execute(&self.pool)
			.await?;
		sqlx::query("CREATE INDEX IF NOT EXISTS batches_user_id_idx ON batches (user_id)")
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job> {
		let status: String = row.try_get("status")?;
		let parameters: serde_json::Value = row.try_get("parameters")?;
		let progress: Option<serde_json::Value> = row.try_get("progress")?;
		let results: Option<serde_json::Value> = row.try_get("results")?;
		let error: Option<serde_json::Value> = row.try_get("error")?;
		let log_entries: serde_json::Value = row.try_get("log_entries")?;
		let access_control: Option<serde_json::Value> = row.try_get("access_control")?;

		Ok(Job {
			job_id: row.try_get("job_id")?,
			job_type: row.try_get("job_type")?,
			job_name: row.try_get("job_name")?,
			status: parse_status(&status)?,
			parameters,
			progress: progress
				.map(serde_json::from_value::<JobProgress>)
				.transpose()?,
			results: results
				.map(serde_json::from_value::<JobResults>)
				.transpose()?,
			error: error.map(serde_json::from_value::<JobError>).transpose()?,
			log_entries: serde_json::from_value::<Vec<LogEntry>>(log_entries)?,
			created_at: row.try_get("created_at")?,
			updated_at: row.try_get("updated_at")?,
			processing_started_at: row.try_get("processing_started_at")?,
			completed_at: row.try_get("completed_at")?,
			user_id: row.try_get("user_id")?,
			access_control: access_control
				.map(serde_json::from_value::<AccessControl>)
				.transpose()?,
			batch_id: row.try_get("batch_id")?,
			archived: row.try_get("archived")?,
		})
	}

	fn row_to_batch(row: &sqlx::postgres::PgRow) -> Result<Batch> {
		let status: String = row.try_get("status")?;
		let access_control: Option<serde_json::Value> = row.try_get("access_control")?;
		Ok(Batch {
			batch_id: row.try_get("batch_id")?,
			batch_name: row.try_get("batch_name")?,
			status: parse_status(&status)?,
			total_jobs: row.try_get("total_jobs")?,
			completed_jobs: row.try_get("completed_jobs")?,
			failed_jobs: row.try_get("failed_jobs")?,
			pending_jobs: row.try_get("pending_jobs")?,
			processing_jobs: row.try_get("processing_jobs")?,
			created_at: row.try_get("created_at")?,
			updated_at: row.try_get("updated_at")?,
			completed_at: row.try_get("completed_at")?,
			user_id: row.try_get("user_id")?,
			access_control: access_control
				.map(serde_json::from_value::<AccessControl>)
				.transpose()?,
			archived: row.try_get("archived")?,
			is_active: row.try_get("is_active")?,
		})
	}
}

fn parse_status(s: &str) -> Result<JobStatus> {
	match s {
		"pending" => Ok(JobStatus::Pending),
		"processing" => Ok(JobStatus::Processing),
		"completed" => Ok(JobStatus::Completed),
		"failed" => Ok(JobStatus::Failed),
		other => anyhow::bail!("unknown job status in store: {other}"),
	}
}

#[async_trait]
impl JobStore for PgJobStore {
	async fn create_job(&self, new_job: NewJob) -> Result<Job> {
		let now = Utc::now();
		let job_id = format!("job-{}", Uuid::new_v4());
		let job_name = new_job
			.job_name
			.or_else(|| Job::derive_job_name(&new_job.job_type, &new_job.parameters));
		let access_control = new_job
			.user_id
			.as_deref()
			.map(AccessControl::owned_by);

		let job = Job {
			job_id,
			job_type: new_job.job_type,
			job_name,
			status: JobStatus::Pending,
			parameters: new_job.parameters,
			progress: None,
			results: None,
			error: None,
			log_entries: Vec::new(),
			created_at: now,
			updated_at: now,
			processing_started_at: None,
			completed_at: None,
			user_id: new_job.user_id,
			access_control,
			batch_id: new_job.batch_id,
			archived: false,
		};

		sqlx::query(
			r#"
            INSERT INTO jobs (
                job_id, job_type, job_name, status, parameters, log_entries,
                created_at, updated_at, user_id, access_control, batch_id, archived
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
		)
		.bind(&job.job_id)
		.bind(&job.job_type)
		.bind(&job.job_name)
		.bind(job.status.as_str())
		.bind(&job.parameters)
		.bind(serde_json::json!([]))
		.bind(job.created_at)
		.bind(job.updated_at)
		.bind(&job.user_id)
		.bind(job.access_control.as_ref().map(serde_json::to_value).transpose()?)
		.bind(&job.batch_id)
		.bind(job.archived)
		.execute(&self.pool)
		.await?;

		Ok(job)
	}

	async fn create_batch(&self, new_batch: NewBatch) -> Result<Batch> {
		let now = Utc::now();
		let batch_id = format!("batch-{}", Uuid::new_v4());
		let batch = Batch {
			batch_name: new_batch.batch_name.or_else(|| Some(batch_id.clone())),
			batch_id,
			status: JobStatus::Processing,
			total_jobs: new_batch.total_jobs,
			completed_jobs: 0,
			failed_jobs: 0,
			pending_jobs: new_batch.total_jobs,
			processing_jobs: 0,
			created_at: now,
			updated_at: now,
			completed_at: None,
			user_id: new_batch.user_id,
			access_control: None,
			archived: false,
			is_active: true,
		};

		sqlx::query(
			r#"
            INSERT INTO batches (
                batch_id, batch_name, status, total_jobs, completed_jobs, failed_jobs,
                pending_jobs, processing_jobs, created_at, updated_at, user_id, archived, is_active
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
		)
		.bind(&batch.batch_id)
		.bind(&batch.batch_name)
		.bind(batch.status.as_str())
		.bind(batch.total_jobs)
		.bind(batch.completed_jobs)
		.bind(batch.failed_jobs)
		.bind(batch.pending_jobs)
		.bind(batch.processing_jobs)
		.bind(batch.created_at)
		.bind(batch.updated_at)
		.bind(&batch.user_id)
		.bind(batch.archived)
		.bind(batch.is_active)
		.execute(&self.pool)
		.await?;

		Ok(batch)
	}

	async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
		let row = sqlx::query("SELECT * FROM jobs WHERE job_id = $1")
			.bind(job_id)
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(Self::row_to_job).transpose()
	}

	async fn get_batch(&self, batch_id: &str) -> Result<Option<Batch>> {
		let row = sqlx::query("SELECT * FROM batches WHERE batch_id = $1")
			.bind(batch_id)
			.fetch_optional(&self.pool)
			.await?;
		row.as_ref().map(Self::row_to_batch).transpose()
	}

	async fn list_jobs(
		&self,
		filter: JobFilter,
		sort: JobSort,
		skip: i64,
		limit: i64,
	) -> Result<Vec<Job>> {
		let order = match sort {
			JobSort::CreatedAtAsc => "ASC",
			JobSort::CreatedAtDesc => "DESC",
		};
		let query = format!(
			"SELECT * FROM jobs WHERE ($1::text IS NULL OR status = $1) \
             AND ($2::text IS NULL OR batch_id = $2) \
             AND ($3::bool IS NULL OR archived = $3) \
             ORDER BY created_at {order} OFFSET $4 LIMIT $5"
		);
		let rows = sqlx::query(&query)
			.bind(filter.status.map(|s| s.as_str().to_string()))
			.bind(filter.batch_id)
			.bind(filter.archived)
			.bind(skip)
			.bind(limit)
			.fetch_all(&self.pool)
			.await?;
		rows.iter().map(Self::row_to_job).collect()
	}

	async fn count_jobs(&self, filter: JobFilter) -> Result<i64> {
		let row = sqlx::query(
			"SELECT COUNT(*) AS n FROM jobs WHERE ($1::text IS NULL OR status = $1) \
             AND ($2::text IS NULL OR batch_id = $2) \
             AND ($3::bool IS NULL OR archived = $3)",
		)
		.bind(filter.status.map(|s| s.as_str().to_string()))
		.bind(filter.batch_id)
		.bind(filter.archived)
		.fetch_one(&self.pool)
		.await?;
		Ok(row.try_get("n")?)
	}

	async fn claim_pending(&self, limit: i64) -> Result<Vec<Job>> {
		let now = Utc::now();
		let rows = sqlx::query(
			r#"
            WITH claimed AS (
                SELECT job_id FROM jobs
                WHERE status = 'pending'
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'processing', processing_started_at = $2, updated_at = $2
            WHERE job_id IN (SELECT job_id FROM claimed)
            RETURNING *
            "#,
		)
		.bind(limit)
		.bind(now)
		.fetch_all(&self.pool)
		.await?;
		let mut jobs: Vec<Job> = rows.iter().map(Self::row_to_job).collect::<Result<_>>()?;
		jobs.sort_by_key(|j| j.created_at);
		Ok(jobs)
	}

	async fn update_job_status(
		&self,
		job_id: &str,
		status: JobStatus,
		progress: Option<JobProgress>,
		results: Option<JobResults>,
		error: Option<JobError>,
	) -> Result<()> {
		let now = Utc::now();
		let processing_started_at = if status == JobStatus::Processing {
			Some(now)
		} else {
			None
		};
		let completed_at = if status.is_terminal() { Some(now) } else { None };

		let result = sqlx::query(
			r#"
            UPDATE jobs SET
                status = $1,
                updated_at = $2,
                processing_started_at = COALESCE($3, processing_started_at),
                completed_at = COALESCE($4, completed_at),
                progress = COALESCE($5, progress),
                results = COALESCE($6, results),
                error = COALESCE($7, error)
            WHERE job_id = $8
            RETURNING batch_id
            "#,
		)
		.bind(status.as_str())
		.bind(now)
		.bind(processing_started_at)
		.bind(completed_at)
		.bind(progress.map(|p| serde_json::to_value(p)).transpose()?)
		.bind(results.map(|r| serde_json::to_value(r)).transpose()?)
		.bind(error.map(|e| serde_json::to_value(e)).transpose()?)
		.bind(job_id)
		.fetch_optional(&self.pool)
		.await?;

		if let Some(row) = result {
			let batch_id: Option<String> = row.try_get("batch_id")?;
			if status.is_terminal() {
				if let Some(batch_id) = batch_id {
					self.aggregate_batch(&batch_id).await?;
				}
			}
		}

		Ok(())
	}

	async fn append_log(&self, job_id: &str, level: &str, message: &str) -> Result<()> {
		let level = crate::model::LogLevel::coerce(level);
		let entry = LogEntry {
			timestamp: Utc::now(),
			level,
			message: message.to_string(),
		};
		let entry_json = serde_json::to_value(&entry)?;
		sqlx::query(
			"UPDATE jobs SET log_entries = log_entries || $1::jsonb, updated_at = $2 WHERE job_id = $3",
		)
		.bind(serde_json::json!([entry_json]))
		.bind(Utc::now())
		.bind(job_id)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	async fn aggregate_batch(&self, batch_id: &str) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		let counts = sqlx::query(
			r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing
            FROM jobs WHERE batch_id = $1
            "#,
		)
		.bind(batch_id)
		.fetch_one(&mut *tx)
		.await?;

		let completed: i64 = counts.try_get("completed")?;
		let failed: i64 = counts.try_get("failed")?;
		let pending: i64 = counts.try_get("pending")?;
		let processing: i64 = counts.try_get("processing")?;

		let batch_row = sqlx::query("SELECT total_jobs FROM batches WHERE batch_id = $1")
			.bind(batch_id)
			.fetch_optional(&mut *tx)
			.await?;
		let Some(batch_row) = batch_row else {
			return Ok(());
		};
		let total_jobs: i64 = batch_row.try_get("total_jobs")?;

		let now = Utc::now();
		let done = completed + failed >= total_jobs;
		let status = if done {
			JobStatus::Completed
		} else {
			JobStatus::Processing
		};
		let completed_at = if done { Some(now) } else { None };

		sqlx::query(
			r#"
            UPDATE batches SET
                completed_jobs = $1,
                failed_jobs = $2,
                pending_jobs = $3,
                processing_jobs = $4,
                status = $5,
                updated_at = $6,
                completed_at = COALESCE($7, completed_at)
            WHERE batch_id = $8
            "#,
		)
		.bind(completed)
		.bind(failed)
		.bind(pending)
		.bind(processing)
		.bind(status.as_str())
		.bind(now)
		.bind(completed_at)
		.bind(batch_id)
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;
		Ok(())
	}

	async fn reset_stalled(&self, cutoff: DateTime<Utc>) -> Result<StalledReset> {
		let now = Utc::now();
		let timeout_minutes = (now - cutoff).num_minutes().max(0);
		let error = JobError::new(
			"PROCESSING_TIMEOUT",
			format!("job exceeded the maximum processing time of {timeout_minutes} minutes"),
		);
		let error_json = serde_json::to_value(&error)?;

		let mut tx = self.pool.begin().await?;
		let rows = sqlx::query(
			r#"
            UPDATE jobs SET
                status = 'failed',
                updated_at = $1,
                completed_at = $1,
                error = $2
            WHERE status = 'processing' AND processing_started_at < $3
            RETURNING batch_id
            "#,
		)
		.bind(now)
		.bind(&error_json)
		.bind(cutoff)
		.fetch_all(&mut *tx)
		.await?;

		let mut batch_ids = std::collections::HashSet::new();
		for row in &rows {
			if let Some(batch_id) = row.try_get::<Option<String>, _>("batch_id")? {
				batch_ids.insert(batch_id);
			}
		}
		tx.commit().await?;

		for batch_id in batch_ids {
			self.aggregate_batch(&batch_id).await?;
		}

		Ok(StalledReset {
			reset_count: rows.len() as u64,
		})
	}

	async fn archive_batch(&self, batch_id: &str) -> Result<()> {
		sqlx::query("UPDATE batches SET archived = true, updated_at = $1 WHERE batch_id = $2")
			.bind(Utc::now())
			.bind(batch_id)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn ping(&self) -> Result<()> {
		sqlx::query("SELECT 1").execute(&self.pool).await?;
		Ok(())
	}
}

#[cfg(feature = "integration-tests")]
#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn connect_to_missing_database_fails_after_retries() {
		let result = PgJobStore::connect("postgres://localhost:1/does_not_exist", 1, 10).await;
		assert!(result.is_err());
	}
}
