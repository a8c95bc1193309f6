//! Standalone audio transcription: requires `filename`, optional
//! `source_language`/`target_language` for translation, emits a
//! transcribing/translating progress sequence. The ASR/translation call
//! itself is out of scope and stubbed. `webhook_data` carries a lightweight
//! `{transcription: {text}}` payload distinct from the persisted
//! `structured_data` envelope, under the `data.transcription.text` path,
//! with no `transcript_text` alias key.

use super::{Handler, HandlerContext, HandlerOutcome};
use crate::error::HandlerError;
use crate::model::JobResults;
use async_trait::async_trait;
use serde_json::json;

pub struct AudioHandler;

#[async_trait]
impl Handler for AudioHandler {
	async fn handle(&self, ctx: HandlerContext) -> Result<HandlerOutcome, HandlerError> {
		let filename = ctx
			.param_str("filename")
			.ok_or_else(|| HandlerError::Validation("`filename` is required".into()))?
			.to_string();
		let target_language = ctx.param_str("target_language");

		ctx.report_progress("initializing", 5, "loading audio")
			.await
			.map_err(HandlerError::from)?;
		ctx.report_progress("transcribing", 55, "transcribing audio")
			.await
			.map_err(HandlerError::from)?;

		if target_language.is_some() {
			ctx.report_progress("translating", 80, "translating transcript")
				.await
				.map_err(HandlerError::from)?;
		}

		ctx.report_progress("postprocessing", 95, "finalizing transcript")
			.await
			.map_err(HandlerError::from)?;

		let transcription = json!({"transcription": {"text": "stub transcript"}});

		Ok(HandlerOutcome {
			results: JobResults {
				markdown_content: Some("stub transcript".to_string()),
				structured_data: Some(json!({
					"source_file": filename,
					"target_language": target_language,
					"data": transcription,
				})),
				..Default::default()
			},
			webhook_data: Some(transcription),
		})
	}
}
