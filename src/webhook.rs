//! Outbound webhook delivery: same header contract, same envelope shape,
//! same "never fail the job" swallow-on-error behavior as the reference
//! transformer handlers' inline progress/completion POSTs. Built on
//! `reqwest`, constructing HTTP clients with explicit per-call timeouts
//! rather than relying on defaults.

use crate::model::{Job, JobError, WebhookConfig};
use crate::observability::MetricsRegistry;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const PROGRESS_TIMEOUT: Duration = Duration::from_secs(15);
const TERMINAL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct JobRef<'a> {
	id: &'a str,
}

/// `{phase: "progress", message, job: {id}, data: {progress}}`. Exactly
/// these top-level keys, no more, so a client parsing with
/// `additionalProperties: false` doesn't break.
#[derive(Debug, Serialize)]
struct ProgressEnvelope<'a> {
	phase: &'a str,
	message: &'a str,
	job: JobRef<'a>,
	data: ProgressData,
}

#[derive(Debug, Serialize)]
struct ProgressData {
	progress: u8,
}

/// `{phase: "completed"|"error", message, job: {id}, data, error?}`. `data`
/// is present (possibly `null`) even on the error phase; `error` is present
/// only on the error phase.
#[derive(Debug, Serialize)]
struct TerminalEnvelope<'a> {
	phase: &'a str,
	message: &'a str,
	job: JobRef<'a>,
	data: Option<&'a Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<&'a JobError>,
}

pub struct WebhookDispatcher {
	progress_client: reqwest::Client,
	terminal_client: reqwest::Client,
	metrics: Option<Arc<MetricsRegistry>>,
}

impl Default for WebhookDispatcher {
	fn default() -> Self {
		Self::new()
	}
}

impl WebhookDispatcher {
	pub fn new() -> Self {
		Self {
			progress_client: reqwest::Client::builder()
				.timeout(PROGRESS_TIMEOUT)
				.build()
				.expect("building progress webhook client"),
			terminal_client: reqwest::Client::builder()
				.timeout(TERMINAL_TIMEOUT)
				.build()
				.expect("building terminal webhook client"),
			metrics: None,
		}
	}

	/// Attach a metrics registry so delivery attempts and failures are
	/// reflected on the `/metrics` surface.
	pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
		self.metrics = Some(metrics);
		self
	}

	fn webhook_config(job: &Job) -> Option<WebhookConfig> {
		let raw = job.parameters.get("webhook")?;
		serde_json::from_value(raw.clone()).ok()
	}

	fn headers(cfg: &WebhookConfig) -> reqwest::header::HeaderMap {
		let mut headers = reqwest::header::HeaderMap::new();
		headers.insert(
			reqwest::header::CONTENT_TYPE,
			"application/json".parse().unwrap(),
		);
		headers.insert(reqwest::header::ACCEPT, "application/json".parse().unwrap());
		if let Some(token) = &cfg.token {
			if let Ok(value) = format!("Bearer {token}").parse() {
				headers.insert(reqwest::header::AUTHORIZATION, value);
			}
			if let Ok(value) = token.parse() {
				headers.insert("X-Callback-Token", value);
			}
		}
		headers
	}

	/// Send a non-terminal progress update. Never returns an error to the
	/// caller: a dead or unreachable callback URL must not fail the job, it
	/// is only logged.
	pub async fn send_progress(&self, job: &Job, _phase: &str, percent: u8, message: &str) {
		let Some(cfg) = Self::webhook_config(job) else {
			return;
		};
		let client_job_id = cfg.job_id.as_deref().unwrap_or(&job.job_id);
		let envelope = ProgressEnvelope {
			phase: "progress",
			message,
			job: JobRef { id: client_job_id },
			data: ProgressData { progress: percent },
		};
		let result = self
			.progress_client
			.post(&cfg.url)
			.headers(Self::headers(&cfg))
			.json(&envelope)
			.send()
			.await;
		if let Some(metrics) = &self.metrics {
			metrics.webhook_deliveries_total.inc();
		}
		if let Err(e) = result {
			if let Some(metrics) = &self.metrics {
				metrics.webhook_failures_total.inc();
			}
			log::warn!(
				"webhook progress delivery failed for job {}: {}",
				job.job_id,
				e
			);
		}
	}

	/// Send the terminal (`completed`/`error`) notification. The failure
	/// phase is `"error"`, not `"failed"`.
	pub async fn send_terminal(
		&self,
		job: &Job,
		succeeded: bool,
		data: Option<&Value>,
		error: Option<&JobError>,
	) {
		let Some(cfg) = Self::webhook_config(job) else {
			return;
		};
		let client_job_id = cfg.job_id.as_deref().unwrap_or(&job.job_id);
		let phase = if succeeded { "completed" } else { "error" };
		let message = if succeeded {
			"Job completed successfully".to_string()
		} else {
			error
				.map(|e| e.message.clone())
				.unwrap_or_else(|| "Job failed".to_string())
		};
		let envelope = TerminalEnvelope {
			phase,
			message: &message,
			job: JobRef { id: client_job_id },
			data,
			error,
		};
		let result = self
			.terminal_client
			.post(&cfg.url)
			.headers(Self::headers(&cfg))
			.json(&envelope)
			.send()
			.await;
		if let Some(metrics) = &self.metrics {
			metrics.webhook_deliveries_total.inc();
		}
		match result {
			Ok(resp) if resp.status().is_success() => {
				log::info!("webhook terminal delivery succeeded for job {}", job.job_id);
			}
			Ok(resp) => {
				if let Some(metrics) = &self.metrics {
					metrics.webhook_failures_total.inc();
				}
				log::warn!(
					"webhook terminal delivery for job {} returned status {}",
					job.job_id,
					resp.status()
				);
			}
			Err(e) => {
				if let Some(metrics) = &self.metrics {
					metrics.webhook_failures_total.inc();
				}
				log::warn!(
					"webhook terminal delivery failed for job {}: {}",
					job.job_id,
					e
				);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{JobStatus, NewJob};
	use chrono::Utc;
	use serde_json::json;

	fn job_with_webhook(url: &str) -> Job {
		Job {
			job_id: "job-1".into(),
			job_type: "transformer_template".into(),
			job_name: None,
			status: JobStatus::Processing,
			parameters: json!({"webhook": {"url": url, "token": "secret", "jobId": "client-1"}}),
			progress: None,
			results: None,
			error: None,
			log_entries: Vec::new(),
			created_at: Utc::now(),
			updated_at: Utc::now(),
			processing_started_at: None,
			completed_at: None,
			user_id: None,
			access_control: None,
			batch_id: None,
			archived: false,
		}
	}

	#[test]
	fn no_webhook_config_when_parameters_lack_it() {
		let _ = NewJob {
			job_type: "pdf".into(),
			job_name: None,
			parameters: json!({}),
			batch_id: None,
			user_id: None,
		};
		let job = Job {
			parameters: json!({}),
			..job_with_webhook("http://example.invalid")
		};
		assert!(WebhookDispatcher::webhook_config(&job).is_none());
	}

	#[test]
	fn webhook_config_parses_url_token_and_job_id() {
		let job = job_with_webhook("http://example.invalid/callback");
		let cfg = WebhookDispatcher::webhook_config(&job).unwrap();
		assert_eq!(cfg.url, "http://example.invalid/callback");
		assert_eq!(cfg.token.as_deref(), Some("secret"));
		assert_eq!(cfg.job_id.as_deref(), Some("client-1"));
	}

	#[tokio::test]
	async fn send_progress_posts_exact_envelope_shape() {
		use wiremock::matchers::{method, path};
		use wiremock::{Mock, MockServer, ResponseTemplate};

		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/callback"))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		let dispatcher = WebhookDispatcher::new();
		let job = job_with_webhook(&format!("{}/callback", server.uri()));
		dispatcher.send_progress(&job, "processing", 42, "halfway").await;

		let requests = server.received_requests().await.unwrap();
		let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
		let obj = body.as_object().unwrap();
		assert_eq!(obj.len(), 4, "progress envelope must carry exactly phase/message/job/data");
		assert_eq!(obj["phase"], "progress");
		assert_eq!(obj["message"], "halfway");
		assert_eq!(obj["job"]["id"], "client-1");
		assert_eq!(obj["data"]["progress"], 42);
	}

	#[tokio::test]
	async fn send_terminal_error_phase_uses_error_not_failed() {
		use wiremock::matchers::{method, path};
		use wiremock::{Mock, MockServer, ResponseTemplate};

		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/callback"))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		let dispatcher = WebhookDispatcher::new();
		let job = job_with_webhook(&format!("{}/callback", server.uri()));
		let error = crate::model::JobError::new("HandlerException", "boom");
		dispatcher.send_terminal(&job, false, None, Some(&error)).await;

		let requests = server.received_requests().await.unwrap();
		let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
		assert_eq!(body["phase"], "error");
		assert_eq!(body["job"]["id"], "client-1");
		assert_eq!(body["error"]["code"], "HandlerException");
		assert!(body["data"].is_null());
	}

	#[tokio::test]
	async fn send_progress_against_unreachable_url_does_not_panic() {
		let dispatcher = WebhookDispatcher::new();
		let job = job_with_webhook("http://127.0.0.1:1/callback");
		dispatcher.send_progress(&job, "processing", 50, "halfway").await;
	}
}
