//! PDF-to-markdown extraction: requires `filename`, emits an
//! initializing/processing/postprocessing progress sequence, and writes a
//! markdown + asset-directory result. The actual PDF text/layout
//! extraction is out of scope and stubbed. `webhook_data` carries a handful
//! of fields (`extracted_text`, `images_archive_data`,
//! `images_archive_filename`, `metadata.text_contents`) out of the full
//! result for the final webhook's `data` section, rather than sending the
//! whole persisted result back to the client.

use super::{Handler, HandlerContext, HandlerOutcome};
use crate::error::HandlerError;
use crate::model::JobResults;
use async_trait::async_trait;
use serde_json::json;

pub struct PdfHandler;

#[async_trait]
impl Handler for PdfHandler {
	async fn handle(&self, ctx: HandlerContext) -> Result<HandlerOutcome, HandlerError> {
		let filename = ctx
			.param_str("filename")
			.ok_or_else(|| HandlerError::Validation("`filename` is required".into()))?
			.to_string();

		ctx.report_progress("initializing", 5, "opening document")
			.await
			.map_err(HandlerError::from)?;
		ctx.report_progress("processing", 60, "extracting text")
			.await
			.map_err(HandlerError::from)?;
		ctx.report_progress("postprocessing", 95, "writing markdown")
			.await
			.map_err(HandlerError::from)?;

		let markdown = format!("# {filename}\n\nextracted content");

		Ok(HandlerOutcome {
			results: JobResults {
				markdown_content: Some(markdown.clone()),
				target_dir: Some(format!("artifacts/{}", ctx.job.job_id)),
				..Default::default()
			},
			webhook_data: Some(json!({"extracted_text": markdown})),
		})
	}
}
