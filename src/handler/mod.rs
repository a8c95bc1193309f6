//! The `Handler` interface and the reference handlers that implement it.
//! Since the actual OCR/ASR/LLM processing each content type needs is
//! explicitly out of scope, each handler validates its parameters, emits
//! the documented progress/webhook sequence, and produces a deterministic
//! stub result in its place.

pub mod audio;
pub mod office;
pub mod office_via_pdf;
pub mod pdf;
pub mod session;
pub mod transformer_template;

use crate::error::HandlerError;
use crate::model::{Job, JobProgress, JobResults};
use crate::store::JobStore;
use crate::webhook::WebhookDispatcher;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Everything a handler needs to process one job: the job snapshot at claim
/// time, and handles back into the store/webhook dispatcher so it can report
/// progress as it runs.
pub struct HandlerContext {
	pub job: Job,
	pub store: Arc<dyn JobStore>,
	pub webhook: Arc<WebhookDispatcher>,
}

impl HandlerContext {
	pub fn new(job: Job, store: Arc<dyn JobStore>, webhook: Arc<WebhookDispatcher>) -> Self {
		Self {
			job,
			store,
			webhook,
		}
	}

	/// Persist a progress update and, if `parameters.webhook` is present,
	/// notify it. Webhook delivery failures are logged but never fail the
	/// job.
	pub async fn report_progress(
		&self,
		step: &str,
		percent: u8,
		message: impl Into<String>,
	) -> anyhow::Result<()> {
		let message = message.into();
		self.store
			.update_job_status(
				&self.job.job_id,
				crate::model::JobStatus::Processing,
				Some(JobProgress::new(step, percent, Some(message.clone()))),
				None,
				None,
			)
			.await?;
		self.webhook
			.send_progress(&self.job, step, percent, &message)
			.await;
		Ok(())
	}

	pub async fn log(&self, level: &str, message: impl Into<String>) -> anyhow::Result<()> {
		self.store
			.append_log(&self.job.job_id, level, &message.into())
			.await
	}

	/// Extract `parameters.<key>` as a string, used by the parameter
	/// destructuring reference handlers do at the top of each call.
	pub fn param_str(&self, key: &str) -> Option<&str> {
		self.job.parameters.get(key).and_then(|v| v.as_str())
	}
}

/// What a handler hands back to the worker on success. The worker wraps
/// `results` into a terminal `update_job_status(Completed, ...)` call and
/// persists it in full. `webhook_data`, if set, is the compact payload sent
/// to the client's webhook instead — handlers whose full `structured_data`
/// carries more than the client needs (e.g. `audio`'s transcription result
/// vs. its full processor envelope) populate this separately. When absent,
/// the worker falls back to sending `results.structured_data` as-is.
#[derive(Debug, Default)]
pub struct HandlerOutcome {
	pub results: JobResults,
	pub webhook_data: Option<Value>,
}

/// A content-transformation job type. Implementations must be side-effect
/// idempotent with respect to retries: the worker never retries a handler
/// automatically, but a handler may itself be re-invoked after a process
/// restart if the job was left PROCESSING and later reset to PENDING by an
/// operator, so handlers should not assume `job.progress` starts empty.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
	async fn handle(&self, ctx: HandlerContext) -> Result<HandlerOutcome, HandlerError>;
}
