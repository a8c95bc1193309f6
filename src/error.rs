//! Closed error taxonomy for the orchestrator. `main`/`run()` bottom out in
//! `anyhow::Result`; everything below that boundary that needs a stable,
//! matchable code uses this enum.

use thiserror::Error;

/// Errors a `Handler` can raise. `code()` yields the exact strings clients
/// and webhook payloads see under `error.code`.
#[derive(Debug, Error)]
pub enum HandlerError {
	#[error("validation error: {0}")]
	Validation(String),
	#[error("{0}")]
	Other(anyhow::Error),
}

impl HandlerError {
	pub fn code(&self) -> &'static str {
		match self {
			HandlerError::Validation(_) => "VALIDATION_ERROR",
			HandlerError::Other(_) => "HandlerException",
		}
	}
}

impl From<anyhow::Error> for HandlerError {
	fn from(e: anyhow::Error) -> Self {
		HandlerError::Other(e)
	}
}

/// Errors surfaced by the store, registry, and worker layers.
#[derive(Debug, Error)]
pub enum OrchestratorError {
	#[error("unknown job type: {0}")]
	UnknownJobType(String),
	#[error("job not found: {0}")]
	NotFound(String),
	#[error("job has no results yet: {0}")]
	NoResults(String),
	#[error("job has no markdown output: {0}")]
	NoMarkdown(String),
	#[error("job has no asset directory: {0}")]
	NoAssetDir(String),
	#[error("job has no raw output: {0}")]
	NoRaw(String),
	#[error("handler raised an exception: {0}")]
	HandlerException(#[source] anyhow::Error),
	#[error("job exceeded max processing time")]
	ProcessingTimeout,
	#[error("validation error: {0}")]
	Validation(String),
	#[error(transparent)]
	Store(#[from] anyhow::Error),
}

impl OrchestratorError {
	/// Stable machine-readable code, matching spec's closed taxonomy.
	pub fn code(&self) -> &'static str {
		match self {
			OrchestratorError::UnknownJobType(_) => "UnknownJobType",
			OrchestratorError::NotFound(_) => "NotFound",
			OrchestratorError::NoResults(_) => "NoResults",
			OrchestratorError::NoMarkdown(_) => "NoMarkdown",
			OrchestratorError::NoAssetDir(_) => "NoAssetDir",
			OrchestratorError::NoRaw(_) => "NoRaw",
			OrchestratorError::HandlerException(_) => "HandlerException",
			OrchestratorError::ProcessingTimeout => "PROCESSING_TIMEOUT",
			OrchestratorError::Validation(_) => "VALIDATION_ERROR",
			OrchestratorError::Store(_) => "STORE_ERROR",
		}
	}
}

impl From<HandlerError> for OrchestratorError {
	fn from(e: HandlerError) -> Self {
		match e {
			HandlerError::Validation(msg) => OrchestratorError::Validation(msg),
			HandlerError::Other(err) => OrchestratorError::HandlerException(err),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn codes_match_taxonomy() {
		assert_eq!(
			OrchestratorError::UnknownJobType("x".into()).code(),
			"UnknownJobType"
		);
		assert_eq!(
			OrchestratorError::NotFound("x".into()).code(),
			"NotFound"
		);
		assert_eq!(OrchestratorError::NoResults("x".into()).code(), "NoResults");
		assert_eq!(OrchestratorError::NoMarkdown("x".into()).code(), "NoMarkdown");
		assert_eq!(OrchestratorError::NoAssetDir("x".into()).code(), "NoAssetDir");
		assert_eq!(OrchestratorError::NoRaw("x".into()).code(), "NoRaw");
		assert_eq!(
			OrchestratorError::HandlerException(anyhow::anyhow!("boom")).code(),
			"HandlerException"
		);
		assert_eq!(OrchestratorError::ProcessingTimeout.code(), "PROCESSING_TIMEOUT");
		assert_eq!(HandlerError::Validation("x".into()).code(), "VALIDATION_ERROR");
		assert_eq!(HandlerError::Other(anyhow::anyhow!("boom")).code(), "HandlerException");
	}
}
