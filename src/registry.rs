//! Handler registry: a `HashMap` built once at startup and held read-only
//! behind `AppState`. `get_handler` returns `None` for an unregistered type
//! rather than silently falling back to a default handler — an unknown job
//! type is an error (`UNKNOWN_JOB_TYPE`), not a guess.

use crate::handler::Handler;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct HandlerRegistry {
	handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn Handler>) {
		self.handlers.insert(job_type.into(), handler);
	}

	pub fn get(&self, job_type: &str) -> Option<Arc<dyn Handler>> {
		self.handlers.get(job_type).cloned()
	}

	pub fn available_job_types(&self) -> Vec<String> {
		let mut types: Vec<String> = self.handlers.keys().cloned().collect();
		types.sort();
		types
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::handler::{HandlerContext, HandlerOutcome};
	use crate::error::HandlerError;
	use async_trait::async_trait;

	struct NoopHandler;

	#[async_trait]
	impl Handler for NoopHandler {
		async fn handle(&self, _ctx: HandlerContext) -> Result<HandlerOutcome, HandlerError> {
			Ok(HandlerOutcome::default())
		}
	}

	#[test]
	fn unregistered_type_returns_none() {
		let registry = HandlerRegistry::new();
		assert!(registry.get("session").is_none());
	}

	#[test]
	fn registered_type_is_returned() {
		let mut registry = HandlerRegistry::new();
		registry.register("pdf", Arc::new(NoopHandler));
		assert!(registry.get("pdf").is_some());
		assert_eq!(registry.available_job_types(), vec!["pdf".to_string()]);
	}
}
