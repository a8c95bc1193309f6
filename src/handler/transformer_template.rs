//! Template-driven text transformation: mutual-exclusion validation (`text`
//! XOR `url`, `template` XOR `template_content`), a fixed progress phase
//! sequence, and a final `structured_data` results shape. The actual
//! LLM/template-rendering call is out of scope; this handler validates and
//! stubs it.

use super::{Handler, HandlerContext, HandlerOutcome};
use crate::error::HandlerError;
use crate::model::JobResults;
use async_trait::async_trait;
use serde_json::json;

pub struct TransformerTemplateHandler;

#[async_trait]
impl Handler for TransformerTemplateHandler {
	async fn handle(&self, ctx: HandlerContext) -> Result<HandlerOutcome, HandlerError> {
		ctx.report_progress("initializing", 5, "preparing transformation")
			.await
			.map_err(HandlerError::from)?;

		let text = ctx.param_str("text");
		let url = ctx.param_str("url");
		let template = ctx.param_str("template");
		let template_content = ctx.param_str("template_content");

		match (text.is_some(), url.is_some()) {
			(false, false) => {
				return Err(HandlerError::Validation(
					"exactly one of `text` or `url` is required".into(),
				));
			}
			(true, true) => {
				return Err(HandlerError::Validation(
					"`text` and `url` are mutually exclusive".into(),
				));
			}
			_ => {}
		}

		match (template.is_some(), template_content.is_some()) {
			(false, false) => {
				return Err(HandlerError::Validation(
					"exactly one of `template` or `template_content` is required".into(),
				));
			}
			(true, true) => {
				return Err(HandlerError::Validation(
					"`template` and `template_content` are mutually exclusive".into(),
				));
			}
			_ => {}
		}

		ctx.report_progress("processing", 50, "rendering template")
			.await
			.map_err(HandlerError::from)?;

		let source = if let Some(text) = text {
			json!({"kind": "text", "value": text})
		} else {
			json!({"kind": "url", "value": url.unwrap_or_default()})
		};

		ctx.report_progress("postprocessing", 95, "finalizing output")
			.await
			.map_err(HandlerError::from)?;

		Ok(HandlerOutcome {
			results: JobResults {
				structured_data: Some(json!({"source": source, "template_applied": true})),
				..Default::default()
			},
			webhook_data: None,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{Job, JobStatus};
	use crate::store::InMemoryJobStore;
	use crate::webhook::WebhookDispatcher;
	use chrono::Utc;
	use serde_json::json;
	use std::sync::Arc;

	fn job(parameters: serde_json::Value) -> Job {
		Job {
			job_id: "job-1".into(),
			job_type: "transformer_template".into(),
			job_name: None,
			status: JobStatus::Processing,
			parameters,
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

	async fn ctx(parameters: serde_json::Value) -> HandlerContext {
		let store: Arc<dyn crate::store::JobStore> = Arc::new(InMemoryJobStore::new());
		let j = job(parameters);
		store
			.create_job(crate::model::NewJob {
				job_type: j.job_type.clone(),
				job_name: None,
				parameters: j.parameters.clone(),
				batch_id: None,
				user_id: None,
			})
			.await
			.ok();
		HandlerContext::new(j, store, Arc::new(WebhookDispatcher::new()))
	}

	#[tokio::test]
	async fn rejects_when_neither_text_nor_url_given() {
		let handler = TransformerTemplateHandler;
		let ctx = ctx(json!({"template": "t"})).await;
		let err = handler.handle(ctx).await.unwrap_err();
		assert_eq!(err.code(), "VALIDATION_ERROR");
	}

	#[tokio::test]
	async fn rejects_when_both_text_and_url_given() {
		let handler = TransformerTemplateHandler;
		let ctx = ctx(json!({"text": "hi", "url": "http://x", "template": "t"})).await;
		let err = handler.handle(ctx).await.unwrap_err();
		assert_eq!(err.code(), "VALIDATION_ERROR");
	}

	#[tokio::test]
	async fn succeeds_with_text_and_template() {
		let handler = TransformerTemplateHandler;
		let ctx = ctx(json!({"text": "hi", "template": "t"})).await;
		let outcome = handler.handle(ctx).await.unwrap();
		assert!(outcome.results.structured_data.is_some());
	}
}
