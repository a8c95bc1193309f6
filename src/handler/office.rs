//! Office document (docx/pptx/xlsx) extraction: same `filename` requirement
//! and progress sequence as `pdf`, targeting office formats directly rather
//! than via a PDF conversion step (see `office_via_pdf` for that variant).

use super::{Handler, HandlerContext, HandlerOutcome};
use crate::error::HandlerError;
use crate::model::JobResults;
use async_trait::async_trait;

pub struct OfficeHandler;

#[async_trait]
impl Handler for OfficeHandler {
	async fn handle(&self, ctx: HandlerContext) -> Result<HandlerOutcome, HandlerError> {
		let filename = ctx
			.param_str("filename")
			.ok_or_else(|| HandlerError::Validation("`filename` is required".into()))?
			.to_string();

		ctx.report_progress("initializing", 5, "opening office document")
			.await
			.map_err(HandlerError::from)?;
		ctx.report_progress("processing", 60, "extracting content")
			.await
			.map_err(HandlerError::from)?;
		ctx.report_progress("postprocessing", 95, "writing markdown")
			.await
			.map_err(HandlerError::from)?;

		Ok(HandlerOutcome {
			results: JobResults {
				markdown_content: Some(format!("# {filename}\n\nextracted office content")),
				target_dir: Some(format!("artifacts/{}", ctx.job.job_id)),
				..Default::default()
			},
			webhook_data: None,
		})
	}
}
