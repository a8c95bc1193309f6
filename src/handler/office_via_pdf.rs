//! Office document extraction via an intermediate PDF conversion step: adds
//! a `converting` phase ahead of the `pdf` handler's sequence, representing
//! an office-to-PDF conversion (e.g. via LibreOffice). Conversion itself is
//! out of scope and stubbed.

use super::{Handler, HandlerContext, HandlerOutcome};
use crate::error::HandlerError;
use crate::model::JobResults;
use async_trait::async_trait;

pub struct OfficeViaPdfHandler;

#[async_trait]
impl Handler for OfficeViaPdfHandler {
	async fn handle(&self, ctx: HandlerContext) -> Result<HandlerOutcome, HandlerError> {
		let filename = ctx
			.param_str("filename")
			.ok_or_else(|| HandlerError::Validation("`filename` is required".into()))?
			.to_string();

		ctx.report_progress("initializing", 5, "opening office document")
			.await
			.map_err(HandlerError::from)?;
		ctx.report_progress("converting", 30, "converting to pdf")
			.await
			.map_err(HandlerError::from)?;
		ctx.report_progress("processing", 70, "extracting text")
			.await
			.map_err(HandlerError::from)?;
		ctx.report_progress("postprocessing", 95, "writing markdown")
			.await
			.map_err(HandlerError::from)?;

		Ok(HandlerOutcome {
			results: JobResults {
				markdown_content: Some(format!("# {filename}\n\nextracted via pdf conversion")),
				target_dir: Some(format!("artifacts/{}", ctx.job.job_id)),
				..Default::default()
			},
			webhook_data: None,
		})
	}
}
