//! Worker fleet: a bounded pool of job executors driven by a poll/stall-sweep
//! loop. `tokio::spawn` runs each claimed job as an independent task, a
//! `Mutex<HashMap<String, JoinHandle<()>>>` tracks in-flight claims, and the
//! poll/stall-sweep cadence is driven by `tokio::select!` over two
//! `tokio::time::interval`s rather than a manual sleep loop.

use crate::observability::MetricsRegistry;
use crate::registry::HandlerRegistry;
use crate::store::JobStore;
use crate::webhook::WebhookDispatcher;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
	pub max_concurrent_workers: usize,
	pub poll_interval: Duration,
	pub stall_check_interval: Duration,
	pub max_processing_minutes: i64,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			max_concurrent_workers: 4,
			poll_interval: Duration::from_secs(2),
			stall_check_interval: Duration::from_secs(60),
			max_processing_minutes: 10,
		}
	}
}

pub struct WorkerManager {
	store: Arc<dyn JobStore>,
	registry: Arc<HandlerRegistry>,
	webhook: Arc<WebhookDispatcher>,
	config: WorkerConfig,
	running: Mutex<HashMap<String, JoinHandle<()>>>,
	metrics: Option<Arc<MetricsRegistry>>,
}

impl WorkerManager {
	pub fn new(
		store: Arc<dyn JobStore>,
		registry: Arc<HandlerRegistry>,
		webhook: Arc<WebhookDispatcher>,
		config: WorkerConfig,
	) -> Arc<Self> {
		Arc::new(Self {
			store,
			registry,
			webhook,
			config,
			running: Mutex::new(HashMap::new()),
			metrics: None,
		})
	}

	/// Attach a metrics registry so claims, completions, failures, and stall
	/// resets are reflected on the `/metrics` surface. Consumed by value
	/// since it's meant to be chained immediately after `new`, before the
	/// `Arc` is shared with `start()`.
	pub fn with_metrics(self: Arc<Self>, metrics: Arc<MetricsRegistry>) -> Arc<Self> {
		Arc::new(Self {
			store: Arc::clone(&self.store),
			registry: Arc::clone(&self.registry),
			webhook: Arc::clone(&self.webhook),
			config: self.config.clone(),
			running: Mutex::new(HashMap::new()),
			metrics: Some(metrics),
		})
	}

	/// Spawn the polling/stall-sweep loop and return its join handle. The
	/// manager runs a one-time stall sweep before entering the loop.
	pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
		let manager = Arc::clone(self);
		tokio::spawn(async move {
			manager.cleanup_stalled().await;

			let mut poll_timer = tokio::time::interval(manager.config.poll_interval);
			let mut stall_timer = tokio::time::interval(manager.config.stall_check_interval);
			poll_timer.tick().await;
			stall_timer.tick().await;

			loop {
				tokio::select! {
					biased;
					_ = stall_timer.tick() => {
						manager.cleanup_stalled().await;
					}
					_ = poll_timer.tick() => {
						manager.cleanup_workers().await;
						manager.poll_once().await;
					}
				}
			}
		})
	}

	async fn cleanup_workers(&self) {
		let mut running = self.running.lock().await;
		running.retain(|_, handle| !handle.is_finished());
	}

	async fn available_slots(&self) -> usize {
		let running = self.running.lock().await;
		self.config.max_concurrent_workers.saturating_sub(running.len())
	}

	async fn poll_once(&self) {
		let slots = self.available_slots().await;
		if slots == 0 {
			return;
		}

		let claimed = match self.store.claim_pending(slots as i64).await {
			Ok(jobs) => jobs,
			Err(e) => {
				log::error!("failed to claim pending jobs: {e}");
				return;
			}
		};

		if let Some(metrics) = &self.metrics {
			if !claimed.is_empty() {
				metrics.jobs_claimed_total.inc_by(claimed.len() as u64);
			}
		}

		for job in claimed {
			self.start_worker(job).await;
		}
	}

	async fn start_worker(&self, job: crate::model::Job) {
		let job_id = job.job_id.clone();
		{
			let running = self.running.lock().await;
			if running.contains_key(&job_id) {
				return;
			}
		}

		if let Err(e) = self
			.store
			.append_log(&job_id, "info", "Job-Verarbeitung gestartet")
			.await
		{
			log::warn!("failed to append start log for job {job_id}: {e}");
		}

		let store = Arc::clone(&self.store);
		let registry = Arc::clone(&self.registry);
		let webhook = Arc::clone(&self.webhook);
		let metrics = self.metrics.clone();
		if let Some(metrics) = &metrics {
			metrics.jobs_in_flight.inc();
		}

		let handle = tokio::spawn(async move {
			run_job(store, registry, webhook, metrics.clone(), job).await;
			if let Some(metrics) = &metrics {
				metrics.jobs_in_flight.dec();
			}
		});

		let mut running = self.running.lock().await;
		running.insert(job_id, handle);
	}

	async fn cleanup_stalled(&self) {
		let cutoff = Utc::now() - chrono::Duration::minutes(self.config.max_processing_minutes);
		match self.store.reset_stalled(cutoff).await {
			Ok(result) if result.reset_count > 0 => {
				log::warn!("reset {} stalled job(s)", result.reset_count);
				if let Some(metrics) = &self.metrics {
					metrics
						.jobs_stalled_reset_total
						.inc_by(result.reset_count as u64);
				}
			}
			Ok(_) => {}
			Err(e) => log::error!("stall sweep failed: {e}"),
		}
	}
}

/// Run a single claimed job to completion. Any error surfaced by the
/// handler (including a panic-free `anyhow::Error` bubbled up through
/// `HandlerError`) is captured into a `JobError` and the job is marked
/// FAILED rather than propagating out of the task.
async fn run_job(
	store: Arc<dyn JobStore>,
	registry: Arc<HandlerRegistry>,
	webhook: Arc<WebhookDispatcher>,
	metrics: Option<Arc<MetricsRegistry>>,
	job: crate::model::Job,
) {
	let job_id = job.job_id.clone();
	let job_type = job.job_type.clone();
	let started = Instant::now();

	let Some(handler) = registry.get(&job_type) else {
		let error = crate::model::JobError::new(
			crate::error::OrchestratorError::UnknownJobType(job_type.clone()).code(),
			format!("no handler registered for job type `{job_type}`"),
		);
		webhook.send_terminal(&job, false, None, Some(&error)).await;
		let _ = store
			.update_job_status(&job_id, crate::model::JobStatus::Failed, None, None, Some(error))
			.await;
		if let Some(metrics) = &metrics {
			metrics.jobs_failed_total.inc();
		}
		return;
	};

	let ctx = crate::handler::HandlerContext::new(job.clone(), Arc::clone(&store), Arc::clone(&webhook));

	match handler.handle(ctx).await {
		Ok(outcome) => {
			let data = outcome
				.webhook_data
				.clone()
				.or_else(|| outcome.results.structured_data.clone());
			if let Err(e) = store
				.update_job_status(
					&job_id,
					crate::model::JobStatus::Completed,
					Some(crate::model::JobProgress::new("completed", 100, None)),
					Some(outcome.results),
					None,
				)
				.await
			{
				log::error!("failed to persist completion for job {job_id}: {e}");
			}
			webhook.send_terminal(&job, true, data.as_ref(), None).await;
			if let Some(metrics) = &metrics {
				metrics.jobs_completed_total.inc();
				metrics
					.job_processing_duration_seconds
					.observe(started.elapsed().as_secs_f64());
			}
		}
		Err(handler_err) => {
			let mut details = std::collections::HashMap::new();
			details.insert(
				"duration_ms".to_string(),
				serde_json::json!(started.elapsed().as_millis() as u64),
			);
			details.insert("traceback".to_string(), serde_json::json!(format!("{handler_err:?}")));
			let error = crate::model::JobError::new(handler_err.code(), handler_err.to_string())
				.with_details(details);
			if let Err(e) = store
				.update_job_status(
					&job_id,
					crate::model::JobStatus::Failed,
					None,
					None,
					Some(error.clone()),
				)
				.await
			{
				log::error!("failed to persist failure for job {job_id}: {e}");
			}
			let _ = store
				.append_log(&job_id, "error", &format!("handler failed: {error}", error = error.message))
				.await;
			webhook.send_terminal(&job, false, None, Some(&error)).await;
			if let Some(metrics) = &metrics {
				metrics.jobs_failed_total.inc();
				metrics
					.job_processing_duration_seconds
					.observe(started.elapsed().as_secs_f64());
			}
		}
	}
}

#[cfg(feature = "worker-tests")]
#[cfg(test)]
mod tests {
	use super::*;
	use crate::handler::{Handler, HandlerContext, HandlerOutcome};
	use crate::model::{JobResults, NewJob};
	use crate::store::InMemoryJobStore;
	use async_trait::async_trait;
	use serde_json::json;

	struct StubHandler;

	#[async_trait]
	impl Handler for StubHandler {
		async fn handle(&self, ctx: HandlerContext) -> Result<HandlerOutcome, crate::error::HandlerError> {
			ctx.report_progress("processing", 50, "working").await.ok();
			Ok(HandlerOutcome {
				results: JobResults::default(),
			})
		}
	}

	#[tokio::test]
	async fn poll_loop_claims_and_completes_pending_jobs() {
		let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
		let mut registry = HandlerRegistry::new();
		registry.register("stub", Arc::new(StubHandler));
		let registry = Arc::new(registry);
		let webhook = Arc::new(WebhookDispatcher::new());

		let job = store
			.create_job(NewJob {
				job_type: "stub".into(),
				job_name: None,
				parameters: json!({}),
				batch_id: None,
				user_id: None,
			})
			.await
			.unwrap();

		let manager = WorkerManager::new(
			Arc::clone(&store),
			registry,
			webhook,
			WorkerConfig {
				max_concurrent_workers: 2,
				poll_interval: Duration::from_millis(10),
				stall_check_interval: Duration::from_secs(3600),
				max_processing_minutes: 10,
			},
		);

		manager.poll_once().await;
		tokio::time::sleep(Duration::from_millis(50)).await;

		let updated = store.get_job(&job.job_id).await.unwrap().unwrap();
		assert_eq!(updated.status, crate::model::JobStatus::Completed);
	}

	#[tokio::test]
	async fn unregistered_job_type_fails_immediately() {
		let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
		let registry = Arc::new(HandlerRegistry::new());
		let webhook = Arc::new(WebhookDispatcher::new());

		let job = store
			.create_job(NewJob {
				job_type: "does-not-exist".into(),
				job_name: None,
				parameters: json!({}),
				batch_id: None,
				user_id: None,
			})
			.await
			.unwrap();

		let manager = WorkerManager::new(store.clone(), registry, webhook, WorkerConfig::default());
		manager.poll_once().await;
		tokio::time::sleep(Duration::from_millis(50)).await;

		let updated = store.get_job(&job.job_id).await.unwrap().unwrap();
		assert_eq!(updated.status, crate::model::JobStatus::Failed);
		assert_eq!(updated.error.unwrap().code, "UnknownJobType");
	}
}
