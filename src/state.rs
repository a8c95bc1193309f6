use std::sync::Arc;

use crate::observability::MetricsRegistry;
use crate::registry::HandlerRegistry;
use crate::store::JobStore;
use crate::webhook::WebhookDispatcher;

/// Application state passed to handlers via Axum's `State` extractor: the
/// job store, the handler registry, the webhook dispatcher, and the
/// metrics registry.
#[derive(Clone)]
pub struct AppState {
	pub store: Arc<dyn JobStore>,
	pub registry: Arc<HandlerRegistry>,
	pub webhook: Arc<WebhookDispatcher>,
	pub metrics: Arc<MetricsRegistry>,
}
