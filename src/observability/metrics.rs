use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Central registry for all Prometheus metrics covering job lifecycle,
/// batch aggregation, webhook delivery, and store queue depth.
pub struct MetricsRegistry {
	registry: Registry,

	pub jobs_created_total: IntCounter,
	pub jobs_claimed_total: IntCounter,
	pub jobs_completed_total: IntCounter,
	pub jobs_failed_total: IntCounter,
	pub jobs_stalled_reset_total: IntCounter,
	pub jobs_in_flight: IntGauge,
	pub job_processing_duration_seconds: Histogram,

	pub batch_aggregations_total: IntCounter,

	pub webhook_deliveries_total: IntCounter,
	pub webhook_failures_total: IntCounter,

	pub store_queue_depth: IntGauge,
}

impl MetricsRegistry {
	pub fn new() -> Self {
		let registry = Registry::new();

		let jobs_created_total = IntCounter::with_opts(
			Opts::new("jobs_created_total", "Total number of jobs created").namespace("jobforge"),
		)
		.unwrap();

		let jobs_claimed_total = IntCounter::with_opts(
			Opts::new("jobs_claimed_total", "Total number of jobs claimed by workers")
				.namespace("jobforge"),
		)
		.unwrap();

		let jobs_completed_total = IntCounter::with_opts(
			Opts::new("jobs_completed_total", "Total number of jobs completed successfully")
				.namespace("jobforge"),
		)
		.unwrap();

		let jobs_failed_total = IntCounter::with_opts(
			Opts::new("jobs_failed_total", "Total number of jobs that failed").namespace("jobforge"),
		)
		.unwrap();

		let jobs_stalled_reset_total = IntCounter::with_opts(
			Opts::new(
				"jobs_stalled_reset_total",
				"Total number of jobs force-failed by the stall sweep",
			)
			.namespace("jobforge"),
		)
		.unwrap();

		let jobs_in_flight = IntGauge::with_opts(
			Opts::new("jobs_in_flight", "Current number of PROCESSING jobs").namespace("jobforge"),
		)
		.unwrap();

		let job_processing_duration_seconds = Histogram::with_opts(
			HistogramOpts::new(
				"job_processing_duration_seconds",
				"Wall-clock duration of a job's PROCESSING phase",
			)
			.namespace("jobforge")
			.buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0]),
		)
		.unwrap();

		let batch_aggregations_total = IntCounter::with_opts(
			Opts::new(
				"batch_aggregations_total",
				"Total number of batch progress recomputations",
			)
			.namespace("jobforge"),
		)
		.unwrap();

		let webhook_deliveries_total = IntCounter::with_opts(
			Opts::new(
				"webhook_deliveries_total",
				"Total number of webhook deliveries attempted",
			)
			.namespace("jobforge"),
		)
		.unwrap();

		let webhook_failures_total = IntCounter::with_opts(
			Opts::new(
				"webhook_failures_total",
				"Total number of webhook deliveries that failed",
			)
			.namespace("jobforge"),
		)
		.unwrap();

		let store_queue_depth = IntGauge::with_opts(
			Opts::new("store_queue_depth", "Current number of PENDING jobs").namespace("jobforge"),
		)
		.unwrap();

		registry
			.register(Box::new(jobs_created_total.clone()))
			.unwrap();
		registry
			.register(Box::new(jobs_claimed_total.clone()))
			.unwrap();
		registry
			.register(Box::new(jobs_completed_total.clone()))
			.unwrap();
		registry
			.register(Box::new(jobs_failed_total.clone()))
			.unwrap();
		registry
			.register(Box::new(jobs_stalled_reset_total.clone()))
			.unwrap();
		registry.register(Box::new(jobs_in_flight.clone())).unwrap();
		registry
			.register(Box::new(job_processing_duration_seconds.clone()))
			.unwrap();
		registry
			.register(Box::new(batch_aggregations_total.clone()))
			.unwrap();
		registry
			.register(Box::new(webhook_deliveries_total.clone()))
			.unwrap();
		registry
			.register(Box::new(webhook_failures_total.clone()))
			.unwrap();
		registry
			.register(Box::new(store_queue_depth.clone()))
			.unwrap();

		Self {
			registry,
			jobs_created_total,
			jobs_claimed_total,
			jobs_completed_total,
			jobs_failed_total,
			jobs_stalled_reset_total,
			jobs_in_flight,
			job_processing_duration_seconds,
			batch_aggregations_total,
			webhook_deliveries_total,
			webhook_failures_total,
			store_queue_depth,
		}
	}

	/// Encode metrics in Prometheus text format
	pub fn encode(&self) -> String {
		let encoder = TextEncoder::new();
		let metric_families = self.registry.gather();
		match encoder.encode_to_string(&metric_families) {
			Ok(s) => s,
			Err(e) => {
				eprintln!("Failed to encode metrics: {}", e);
				String::new()
			}
		}
	}
}

impl Default for MetricsRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// Initialize the global metrics registry
pub fn init_metrics() -> Arc<MetricsRegistry> {
	Arc::new(MetricsRegistry::new())
}

#[cfg(feature = "unit-tests")]
mod tests {
	#[test]
	fn metrics_registry_creation() {
		let registry = super::MetricsRegistry::new();
		assert!(!registry.encode().is_empty());
	}

	#[test]
	fn metrics_increment() {
		let registry = super::MetricsRegistry::new();
		registry.jobs_created_total.inc();
		registry.jobs_completed_total.inc_by(10);
		assert!(!registry.encode().is_empty());
	}
}
