//! Conference-session processing: transcribes a recording and folds in
//! slide/attachment text to produce a combined markdown writeup, following
//! a fixed progress percentage sequence (initializing -> 0, fetching -> 20,
//! transcribing -> 60, assembling -> 90, completed -> 100).
//! Transcription/slide-extraction are out of scope and stubbed.

use super::{Handler, HandlerContext, HandlerOutcome};
use crate::error::HandlerError;
use crate::model::JobResults;
use async_trait::async_trait;
use serde_json::json;

pub struct SessionHandler;

#[async_trait]
impl Handler for SessionHandler {
	async fn handle(&self, ctx: HandlerContext) -> Result<HandlerOutcome, HandlerError> {
		let session = ctx.param_str("session").unwrap_or("untitled-session");
		let video_url = ctx.param_str("video_url");

		ctx.report_progress("initializing", 0, "preparing session job")
			.await
			.map_err(HandlerError::from)?;
		ctx.report_progress("fetching", 20, "fetching recording and attachments")
			.await
			.map_err(HandlerError::from)?;

		if video_url.is_some() {
			ctx.report_progress("transcribing", 60, "transcribing recording")
				.await
				.map_err(HandlerError::from)?;
		}

		ctx.report_progress("assembling", 90, "assembling session writeup")
			.await
			.map_err(HandlerError::from)?;

		Ok(HandlerOutcome {
			results: JobResults {
				markdown_content: Some(format!("# {session}\n\nsession writeup")),
				structured_data: Some(json!({
					"context": {"session": session},
					"video_transcript": video_url.map(|_| "stub transcript"),
				})),
				asset_dir: Some(format!("artifacts/{}/assets", ctx.job.job_id)),
				..Default::default()
			},
			webhook_data: None,
		})
	}
}
