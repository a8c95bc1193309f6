use jobforge::observability::{MetricsRegistry, init_metrics};

#[cfg(feature = "unit-tests")]
#[test]
fn test_metrics_registry_creation() {
	let registry = MetricsRegistry::new();
	let output = registry.encode();

	assert!(output.contains("jobforge_jobs_created_total"));
	assert!(output.contains("jobforge_jobs_claimed_total"));
	assert!(output.contains("jobforge_jobs_completed_total"));
	assert!(output.contains("jobforge_jobs_failed_total"));
	assert!(output.contains("jobforge_jobs_stalled_reset_total"));
	assert!(output.contains("jobforge_webhook_deliveries_total"));
}

#[cfg(feature = "unit-tests")]
#[test]
fn test_metrics_increment() {
	let registry = MetricsRegistry::new();

	registry.jobs_created_total.inc();
	registry.jobs_claimed_total.inc_by(5);
	registry.jobs_completed_total.inc_by(3);

	let output = registry.encode();

	assert!(output.contains("jobforge_jobs_created_total 1"));
	assert!(output.contains("jobforge_jobs_claimed_total 5"));
	assert!(output.contains("jobforge_jobs_completed_total 3"));
}

#[cfg(feature = "unit-tests")]
#[test]
fn test_metrics_gauge_operations() {
	let registry = MetricsRegistry::new();

	registry.store_queue_depth.set(50);
	registry.jobs_in_flight.set(4);

	let output = registry.encode();

	assert!(output.contains("jobforge_store_queue_depth 50"));
	assert!(output.contains("jobforge_jobs_in_flight 4"));

	registry.jobs_in_flight.inc();
	registry.jobs_in_flight.dec();

	let output2 = registry.encode();
	assert!(output2.contains("jobforge_jobs_in_flight 4"));
}

#[cfg(feature = "unit-tests")]
#[test]
fn test_metrics_histogram_observations() {
	let registry = MetricsRegistry::new();

	registry.job_processing_duration_seconds.observe(0.5);
	registry.job_processing_duration_seconds.observe(12.0);
	registry.job_processing_duration_seconds.observe(90.0);

	let output = registry.encode();

	assert!(output.contains("jobforge_job_processing_duration_seconds_bucket"));
	assert!(output.contains("jobforge_job_processing_duration_seconds_sum"));
	assert!(output.contains("jobforge_job_processing_duration_seconds_count"));
}

#[cfg(feature = "unit-tests")]
#[test]
fn test_init_metrics() {
	let metrics = init_metrics();
	assert!(!metrics.encode().is_empty());
}

#[cfg(feature = "integration-tests")]
#[tokio::test]
async fn test_metrics_reflect_worker_lifecycle() {
	use jobforge::model::{JobStatus, NewJob};
	use jobforge::registry::HandlerRegistry;
	use jobforge::store::{InMemoryJobStore, JobStore};
	use jobforge::webhook::WebhookDispatcher;
	use jobforge::worker::{WorkerConfig, WorkerManager};
	use serde_json::json;
	use std::sync::Arc;
	use std::time::Duration;

	let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
	let mut registry = HandlerRegistry::new();
	registry.register("pdf", Arc::new(jobforge::handler::pdf::PdfHandler));
	let registry = Arc::new(registry);
	let webhook = Arc::new(WebhookDispatcher::new());
	let metrics = Arc::new(MetricsRegistry::new());

	let manager = WorkerManager::new(
		Arc::clone(&store),
		registry,
		webhook,
		WorkerConfig {
			max_concurrent_workers: 2,
			poll_interval: Duration::from_millis(20),
			stall_check_interval: Duration::from_secs(3600),
			max_processing_minutes: 10,
		},
	)
	.with_metrics(metrics.clone());
	manager.start();

	store
		.create_job(NewJob {
			job_type: "pdf".into(),
			job_name: None,
			parameters: json!({"filename": "/tmp/in.pdf"}),
			batch_id: None,
			user_id: None,
		})
		.await
		.expect("create job");

	for _ in 0..50 {
		let output = metrics.encode();
		if output.contains("jobforge_jobs_completed_total 1") {
			break;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}

	let output = metrics.encode();
	assert!(output.contains("jobforge_jobs_claimed_total 1"));
	assert!(output.contains("jobforge_jobs_completed_total 1"));
}
