//! In-memory `JobStore` implementation backed by a `Mutex<HashMap<...>>`
//! rather than a network call: used by unit tests and as the fallback
//! store when no database is configured.

use super::{JobStore, StalledReset};
use crate::model::{
	AccessControl, Batch, Job, JobError, JobFilter, JobProgress, JobResults, JobSort, JobStatus,
	LogEntry, LogLevel, NewBatch, NewJob,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
	jobs: HashMap<String, Job>,
	batches: HashMap<String, Batch>,
}

/// Thread-safe in-memory store. Claim ordering and batch aggregation mirror
/// `PgJobStore`'s semantics exactly so tests written against this double
/// also exercise the real contract.
#[derive(Default)]
pub struct InMemoryJobStore {
	inner: Mutex<Inner>,
}

impl InMemoryJobStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn aggregate_locked(inner: &mut Inner, batch_id: &str) {
		let Some(batch) = inner.batches.get(batch_id) else {
			return;
		};
		let total_jobs = batch.total_jobs;

		let mut completed = 0;
		let mut failed = 0;
		let mut pending = 0;
		let mut processing = 0;
		for job in inner.jobs.values() {
			if job.batch_id.as_deref() != Some(batch_id) {
				continue;
			}
			match job.status {
				JobStatus::Completed => completed += 1,
				JobStatus::Failed => failed += 1,
				JobStatus::Pending => pending += 1,
				JobStatus::Processing => processing += 1,
			}
		}

		let done = completed + failed >= total_jobs;
		if let Some(batch) = inner.batches.get_mut(batch_id) {
			batch.completed_jobs = completed;
			batch.failed_jobs = failed;
			batch.pending_jobs = pending;
			batch.processing_jobs = processing;
			batch.updated_at = Utc::now();
			if done {
				batch.status = JobStatus::Completed;
				batch.completed_at = Some(Utc::now());
			} else {
				batch.status = JobStatus::Processing;
			}
		}
	}
}

#[async_trait]
impl JobStore for InMemoryJobStore {
	async fn create_job(&self, new_job: NewJob) -> anyhow::Result<Job> {
		let now = Utc::now();
		let job_name = new_job
			.job_name
			.or_else(|| Job::derive_job_name(&new_job.job_type, &new_job.parameters));
		let access_control = new_job.user_id.as_deref().map(AccessControl::owned_by);
		let job = Job {
			job_id: format!("job-{}", Uuid::new_v4()),
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
		let mut inner = self.inner.lock().unwrap();
		inner.jobs.insert(job.job_id.clone(), job.clone());
		Ok(job)
	}

	async fn create_batch(&self, new_batch: NewBatch) -> anyhow::Result<Batch> {
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
		let mut inner = self.inner.lock().unwrap();
		inner.batches.insert(batch.batch_id.clone(), batch.clone());
		Ok(batch)
	}

	async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<Job>> {
		Ok(self.inner.lock().unwrap().jobs.get(job_id).cloned())
	}

	async fn get_batch(&self, batch_id: &str) -> anyhow::Result<Option<Batch>> {
		Ok(self.inner.lock().unwrap().batches.get(batch_id).cloned())
	}

	async fn list_jobs(
		&self,
		filter: JobFilter,
		sort: JobSort,
		skip: i64,
		limit: i64,
	) -> anyhow::Result<Vec<Job>> {
		let inner = self.inner.lock().unwrap();
		let mut jobs: Vec<Job> = inner
			.jobs
			.values()
			.filter(|j| filter.status.is_none_or(|s| j.status == s))
			.filter(|j| {
				filter
					.batch_id
					.as_deref()
					.is_none_or(|b| j.batch_id.as_deref() == Some(b))
			})
			.filter(|j| filter.archived.is_none_or(|a| j.archived == a))
			.cloned()
			.collect();
		jobs.sort_by_key(|j| j.created_at);
		if sort == JobSort::CreatedAtDesc {
			jobs.reverse();
		}
		let skip = skip.max(0) as usize;
		let limit = limit.max(0) as usize;
		Ok(jobs.into_iter().skip(skip).take(limit).collect())
	}

	async fn count_jobs(&self, filter: JobFilter) -> anyhow::Result<i64> {
		let inner = self.inner.lock().unwrap();
		let count = inner
			.jobs
			.values()
			.filter(|j| filter.status.is_none_or(|s| j.status == s))
			.filter(|j| {
				filter
					.batch_id
					.as_deref()
					.is_none_or(|b| j.batch_id.as_deref() == Some(b))
			})
			.filter(|j| filter.archived.is_none_or(|a| j.archived == a))
			.count();
		Ok(count as i64)
	}

	async fn claim_pending(&self, limit: i64) -> anyhow::Result<Vec<Job>> {
		let mut inner = self.inner.lock().unwrap();
		let now = Utc::now();
		let mut pending_ids: Vec<String> = inner
			.jobs
			.values()
			.filter(|j| j.status == JobStatus::Pending)
			.map(|j| j.job_id.clone())
			.collect();
		pending_ids.sort_by_key(|id| inner.jobs[id].created_at);
		pending_ids.truncate(limit.max(0) as usize);

		let mut claimed = Vec::new();
		for id in pending_ids {
			if let Some(job) = inner.jobs.get_mut(&id) {
				job.status = JobStatus::Processing;
				job.processing_started_at = Some(now);
				job.updated_at = now;
				claimed.push(job.clone());
			}
		}
		Ok(claimed)
	}

	async fn update_job_status(
		&self,
		job_id: &str,
		status: JobStatus,
		progress: Option<JobProgress>,
		results: Option<JobResults>,
		error: Option<JobError>,
	) -> anyhow::Result<()> {
		let now = Utc::now();
		let mut batch_to_aggregate = None;
		{
			let mut inner = self.inner.lock().unwrap();
			let Some(job) = inner.jobs.get_mut(job_id) else {
				anyhow::bail!("job not found: {job_id}");
			};
			job.status = status;
			job.updated_at = now;
			if status == JobStatus::Processing {
				job.processing_started_at = Some(now);
			}
			if status.is_terminal() {
				job.completed_at = Some(now);
			}
			if let Some(progress) = progress {
				job.progress = Some(progress);
			}
			if let Some(results) = results {
				job.results = Some(results);
			}
			if let Some(error) = error {
				job.error = Some(error);
			}
			if status.is_terminal() {
				batch_to_aggregate = job.batch_id.clone();
			}
		}
		if let Some(batch_id) = batch_to_aggregate {
			self.aggregate_batch(&batch_id).await?;
		}
		Ok(())
	}

	async fn append_log(&self, job_id: &str, level: &str, message: &str) -> anyhow::Result<()> {
		let mut inner = self.inner.lock().unwrap();
		let Some(job) = inner.jobs.get_mut(job_id) else {
			anyhow::bail!("job not found: {job_id}");
		};
		job.log_entries.push(LogEntry {
			timestamp: Utc::now(),
			level: LogLevel::coerce(level),
			message: message.to_string(),
		});
		job.updated_at = Utc::now();
		Ok(())
	}

	async fn aggregate_batch(&self, batch_id: &str) -> anyhow::Result<()> {
		let mut inner = self.inner.lock().unwrap();
		Self::aggregate_locked(&mut inner, batch_id);
		Ok(())
	}

	async fn reset_stalled(&self, cutoff: DateTime<Utc>) -> anyhow::Result<StalledReset> {
		let mut inner = self.inner.lock().unwrap();
		let now = Utc::now();
		let timeout_minutes = (now - cutoff).num_minutes().max(0);
		let mut batch_ids = std::collections::HashSet::new();
		let mut reset_count = 0u64;

		let stalled_ids: Vec<String> = inner
			.jobs
			.values()
			.filter(|j| {
				j.status == JobStatus::Processing
					&& j.processing_started_at.is_some_and(|t| t < cutoff)
			})
			.map(|j| j.job_id.clone())
			.collect();

		for id in stalled_ids {
			if let Some(job) = inner.jobs.get_mut(&id) {
				job.status = JobStatus::Failed;
				job.updated_at = now;
				job.completed_at = Some(now);
				job.error = Some(JobError::new(
					"PROCESSING_TIMEOUT",
					format!("job exceeded the maximum processing time of {timeout_minutes} minutes"),
				));
				if let Some(batch_id) = job.batch_id.clone() {
					batch_ids.insert(batch_id);
				}
				reset_count += 1;
			}
		}

		for batch_id in batch_ids {
			Self::aggregate_locked(&mut inner, &batch_id);
		}

		Ok(StalledReset { reset_count })
	}

	async fn archive_batch(&self, batch_id: &str) -> anyhow::Result<()> {
		let mut inner = self.inner.lock().unwrap();
		if let Some(batch) = inner.batches.get_mut(batch_id) {
			batch.archived = true;
			batch.updated_at = Utc::now();
		}
		Ok(())
	}

	async fn ping(&self) -> anyhow::Result<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn store() -> InMemoryJobStore {
		InMemoryJobStore::new()
	}

	#[tokio::test]
	async fn claim_pending_marks_processing_and_is_fifo() {
		let store = store();
		let j1 = store
			.create_job(NewJob {
				job_type: "pdf".into(),
				job_name: None,
				parameters: json!({}),
				batch_id: None,
				user_id: None,
			})
			.await
			.unwrap();
		let j2 = store
			.create_job(NewJob {
				job_type: "pdf".into(),
				job_name: None,
				parameters: json!({}),
				batch_id: None,
				user_id: None,
			})
			.await
			.unwrap();

		let claimed = store.claim_pending(1).await.unwrap();
		assert_eq!(claimed.len(), 1);
		assert_eq!(claimed[0].job_id, j1.job_id);
		assert_eq!(claimed[0].status, JobStatus::Processing);

		let claimed2 = store.claim_pending(5).await.unwrap();
		assert_eq!(claimed2.len(), 1);
		assert_eq!(claimed2[0].job_id, j2.job_id);
	}

	#[tokio::test]
	async fn terminal_update_triggers_batch_aggregation() {
		let store = store();
		let batch = store
			.create_batch(NewBatch {
				total_jobs: 2,
				batch_name: None,
				user_id: None,
			})
			.await
			.unwrap();
		let j1 = store
			.create_job(NewJob {
				job_type: "pdf".into(),
				job_name: None,
				parameters: json!({}),
				batch_id: Some(batch.batch_id.clone()),
				user_id: None,
			})
			.await
			.unwrap();
		let j2 = store
			.create_job(NewJob {
				job_type: "pdf".into(),
				job_name: None,
				parameters: json!({}),
				batch_id: Some(batch.batch_id.clone()),
				user_id: None,
			})
			.await
			.unwrap();

		store
			.update_job_status(&j1.job_id, JobStatus::Completed, None, None, None)
			.await
			.unwrap();
		let mid = store.get_batch(&batch.batch_id).await.unwrap().unwrap();
		assert_eq!(mid.status, JobStatus::Processing);
		assert_eq!(mid.completed_jobs, 1);

		store
			.update_job_status(&j2.job_id, JobStatus::Failed, None, None, None)
			.await
			.unwrap();
		let done = store.get_batch(&batch.batch_id).await.unwrap().unwrap();
		assert_eq!(done.status, JobStatus::Completed);
		assert_eq!(done.completed_jobs, 1);
		assert_eq!(done.failed_jobs, 1);
		assert!(done.completed_at.is_some());
	}

	#[tokio::test]
	async fn append_log_coerces_invalid_level() {
		let store = store();
		let job = store
			.create_job(NewJob {
				job_type: "pdf".into(),
				job_name: None,
				parameters: json!({}),
				batch_id: None,
				user_id: None,
			})
			.await
			.unwrap();
		store
			.append_log(&job.job_id, "trace", "hello")
			.await
			.unwrap();
		let job = store.get_job(&job.job_id).await.unwrap().unwrap();
		assert_eq!(job.log_entries.len(), 1);
		assert!(matches!(job.log_entries[0].level, LogLevel::Info));
	}

	#[tokio::test]
	async fn reset_stalled_force_fails_old_processing_jobs() {
		let store = store();
		let job = store
			.create_job(NewJob {
				job_type: "pdf".into(),
				job_name: None,
				parameters: json!({}),
				batch_id: None,
				user_id: None,
			})
			.await
			.unwrap();
		store.claim_pending(1).await.unwrap();

		let future_cutoff = Utc::now() + chrono::Duration::minutes(5);
		let reset = store.reset_stalled(future_cutoff).await.unwrap();
		assert_eq!(reset.reset_count, 1);
		let job = store.get_job(&job.job_id).await.unwrap().unwrap();
		assert_eq!(job.status, JobStatus::Failed);
		assert_eq!(job.error.unwrap().code, "PROCESSING_TIMEOUT");
	}
}
