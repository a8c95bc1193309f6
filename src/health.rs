use axum::{extract::State, http::StatusCode, response::IntoResponse};

/// DB health endpoint: returns 200 OK when the configured store can run a
/// simple query, otherwise returns 503 Service Unavailable.
pub async fn db_health(State(state): State<crate::state::AppState>) -> impl IntoResponse {
	match state.store.ping().await {
		Ok(()) => (StatusCode::OK, "OK").into_response(),
		Err(e) => (StatusCode::SERVICE_UNAVAILABLE, format!("db error: {}", e)).into_response(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::observability::metrics::init_metrics;
	use crate::registry::HandlerRegistry;
	use crate::store::JobStore;
	use crate::webhook::WebhookDispatcher;
	use anyhow::{Result, anyhow};
	use async_trait::async_trait;
	use std::sync::Arc;

	// Minimal JobStore double so db_health's success/failure branches can
	// be tested without a real database.
	struct MockJobStore {
		should_succeed: bool,
	}

	#[async_trait]
	impl JobStore for MockJobStore {
		async fn create_job(&self, _new_job: crate::model::NewJob) -> Result<crate::model::Job> {
			unimplemented!("not needed for health tests")
		}
		async fn create_batch(&self, _new_batch: crate::model::NewBatch) -> Result<crate::model::Batch> {
			unimplemented!("not needed for health tests")
		}
		async fn get_job(&self, _job_id: &str) -> Result<Option<crate::model::Job>> {
			Ok(None)
		}
		async fn get_batch(&self, _batch_id: &str) -> Result<Option<crate::model::Batch>> {
			Ok(None)
		}
		async fn list_jobs(
			&self,
			_filter: crate::model::JobFilter,
			_sort: crate::model::JobSort,
			_skip: i64,
			_limit: i64,
		) -> Result<Vec<crate::model::Job>> {
			Ok(Vec::new())
		}
		async fn count_jobs(&self, _filter: crate::model::JobFilter) -> Result<i64> {
			Ok(0)
		}
		async fn claim_pending(&self, _limit: i64) -> Result<Vec<crate::model::Job>> {
			Ok(Vec::new())
		}
		async fn update_job_status(
			&self,
			_job_id: &str,
			_status: crate::model::JobStatus,
			_progress: Option<crate::model::JobProgress>,
			_results: Option<crate::model::JobResults>,
			_error: Option<crate::model::JobError>,
		) -> Result<()> {
			Ok(())
		}
		async fn append_log(&self, _job_id: &str, _level: &str, _message: &str) -> Result<()> {
			Ok(())
		}
		async fn aggregate_batch(&self, _batch_id: &str) -> Result<()> {
			Ok(())
		}
		async fn archive_batch(&self, _batch_id: &str) -> Result<()> {
			Ok(())
		}
		async fn reset_stalled(
			&self,
			_cutoff: chrono::DateTime<chrono::Utc>,
		) -> Result<crate::store::StalledReset> {
			Ok(crate::store::StalledReset { reset_count: 0 })
		}
		async fn ping(&self) -> Result<()> {
			if self.should_succeed {
				Ok(())
			} else {
				Err(anyhow!("database unavailable"))
			}
		}
	}

	fn state(should_succeed: bool) -> crate::state::AppState {
		crate::state::AppState {
			store: Arc::new(MockJobStore { should_succeed }),
			registry: Arc::new(HandlerRegistry::new()),
			webhook: Arc::new(WebhookDispatcher::new()),
			metrics: init_metrics(),
		}
	}

	#[tokio::test]
	async fn health_check_returns_ok_when_db_healthy() {
		let response = db_health(State(state(true))).await.into_response();
		assert_eq!(response.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn health_check_returns_service_unavailable_when_db_fails() {
		let response = db_health(State(state(false))).await.into_response();
		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
	}
}
