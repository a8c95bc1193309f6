//! HTTP surface. Axum handlers over the shared `AppState`, returning
//! `impl IntoResponse`, with routes registered in `run()` and middleware
//! layered around the whole router. The list endpoints (`GET /jobs`,
//! `GET /jobs/batch/{id}/jobs`) expose the `JobStore::list_jobs`/
//! `count_jobs` contract operations, which otherwise have no HTTP surface
//! of their own.

use crate::model::{JobFilter, JobSort, JobStatus, NewBatch, NewJob};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Write;
use std::time::Duration;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
	pub job_type: String,
	#[serde(default)]
	pub job_name: Option<String>,
	#[serde(default = "default_parameters")]
	pub parameters: Value,
	#[serde(default)]
	pub user_id: Option<String>,
	/// Optional long-poll budget: hold the response open until the job
	/// reaches a terminal status or this many milliseconds elapse.
	#[serde(default)]
	pub wait_ms: Option<u64>,
}

fn default_parameters() -> Value {
	json!({})
}

fn acceptance_envelope(job: &crate::model::Job, delivered_to: Option<&str>) -> Value {
	json!({
		"status": "accepted",
		"job": {"id": job.job_id},
		"process": {
			"id": job.job_id,
			"started": job.status == JobStatus::Processing,
			"main_processor": job.job_type,
			"is_from_cache": false,
		},
		"webhook": delivered_to,
		"error": null,
	})
}

fn webhook_url(job: &crate::model::Job) -> Option<String> {
	job.parameters
		.get("webhook")
		.and_then(|w| w.get("url"))
		.and_then(|u| u.as_str())
		.map(str::to_string)
}

/// `POST /jobs` — create a single job. Returns a canonical acceptance
/// payload at 202 unless `wait_ms` is given, in which case the handler
/// polls `getJob` until the job reaches a terminal status or the deadline
/// elapses: COMPLETED resolves inline at 200, FAILED resolves as an error
/// envelope at 400. Job-type existence is validated lazily at worker
/// dispatch, not here, so this handler only requires a non-empty
/// `job_type` string.
pub async fn create_job(
	State(state): State<AppState>,
	Json(req): Json<CreateJobRequest>,
) -> Response {
	if req.job_type.trim().is_empty() {
		return error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "job_type is required");
	}

	let wait_ms = req.wait_ms;
	let job = match state
		.store
		.create_job(NewJob {
			job_type: req.job_type,
			job_name: req.job_name,
			parameters: req.parameters,
			batch_id: None,
			user_id: req.user_id,
		})
		.await
	{
		Ok(job) => job,
		Err(e) => {
			return error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", &e.to_string());
		}
	};
	state.metrics.jobs_created_total.inc();

	let Some(wait_ms) = wait_ms else {
		let webhook = webhook_url(&job);
		return (StatusCode::ACCEPTED, Json(acceptance_envelope(&job, webhook.as_deref())))
			.into_response();
	};

	match wait_for_terminal(&state, &job.job_id, wait_ms).await {
		Some(final_job) if final_job.status == JobStatus::Completed => {
			let data = final_job
				.results
				.as_ref()
				.and_then(|r| r.structured_data.clone());
			(StatusCode::OK, Json(json!({"status": "success", "data": data}))).into_response()
		}
		Some(final_job) if final_job.status == JobStatus::Failed => error_response(
			StatusCode::BAD_REQUEST,
			final_job.error.as_ref().map(|e| e.code.as_str()).unwrap_or("HandlerException"),
			final_job.error.as_ref().map(|e| e.message.as_str()).unwrap_or("job failed"),
		),
		_ => {
			let webhook = webhook_url(&job);
			(StatusCode::ACCEPTED, Json(acceptance_envelope(&job, webhook.as_deref())))
				.into_response()
		}
	}
}

/// Poll `getJob` at a fixed 250ms cadence until the job reaches a terminal
/// status or `wait_ms` elapses.
async fn wait_for_terminal(
	state: &AppState,
	job_id: &str,
	wait_ms: u64,
) -> Option<crate::model::Job> {
	let deadline = tokio::time::Instant::now() + Duration::from_millis(wait_ms);
	loop {
		let job = state.store.get_job(job_id).await.ok().flatten()?;
		if job.status.is_terminal() {
			return Some(job);
		}
		if tokio::time::Instant::now() >= deadline {
			return Some(job);
		}
		tokio::time::sleep(WAIT_POLL_INTERVAL.min(deadline.saturating_duration_since(tokio::time::Instant::now()))).await;
	}
}

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
	#[serde(default)]
	pub batch_name: Option<String>,
	#[serde(default)]
	pub user_id: Option<String>,
	pub jobs: Vec<CreateJobRequest>,
}

/// `POST /jobs/batch` — create a batch and its constituent jobs atomically
/// from the caller's perspective (each job creation is independent at the
/// store layer). Returns the synchronous success envelope rather than the
/// single-job acceptance shape: a batch has no single `process` to
/// describe.
pub async fn create_batch(
	State(state): State<AppState>,
	Json(req): Json<CreateBatchRequest>,
) -> Response {
	let job_count = req.jobs.len();

	let batch = match state
		.store
		.create_batch(NewBatch {
			total_jobs: req.jobs.len() as i64,
			batch_name: req.batch_name,
			user_id: req.user_id.clone(),
		})
		.await
	{
		Ok(batch) => batch,
		Err(e) => {
			return error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", &e.to_string());
		}
	};

	let mut job_ids = Vec::with_capacity(req.jobs.len());
	for job_req in req.jobs {
		match state
			.store
			.create_job(NewJob {
				job_type: job_req.job_type,
				job_name: job_req.job_name,
				parameters: job_req.parameters,
				batch_id: Some(batch.batch_id.clone()),
				user_id: req.user_id.clone(),
			})
			.await
		{
			Ok(job) => {
				state.metrics.jobs_created_total.inc();
				job_ids.push(job.job_id);
			}
			Err(e) => {
				return error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", &e.to_string());
			}
		}
	}

	let batch = if job_count == 0 {
		if let Err(e) = state.store.aggregate_batch(&batch.batch_id).await {
			return error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", &e.to_string());
		}
		match state.store.get_batch(&batch.batch_id).await {
			Ok(Some(batch)) => batch,
			Ok(None) => batch,
			Err(e) => {
				return error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", &e.to_string());
			}
		}
	} else {
		batch
	};

	(
		StatusCode::CREATED,
		Json(json!({
			"status": "success",
			"data": {"batch_id": batch.batch_id, "job_ids": job_ids, "batch": batch},
		})),
	)
		.into_response()
}

/// `GET /jobs/{job_id}`
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
	match state.store.get_job(&job_id).await {
		Ok(Some(job)) => Json(json!({"status": "success", "data": job})).into_response(),
		Ok(None) => error_response(StatusCode::NOT_FOUND, "NotFound", "job not found"),
		Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", &e.to_string()),
	}
}

/// `GET /jobs/batch/{batch_id}`
pub async fn get_batch(State(state): State<AppState>, Path(batch_id): Path<String>) -> Response {
	match state.store.get_batch(&batch_id).await {
		Ok(Some(batch)) => Json(json!({"status": "success", "data": batch})).into_response(),
		Ok(None) => error_response(StatusCode::NOT_FOUND, "NotFound", "batch not found"),
		Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", &e.to_string()),
	}
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
	pub status: Option<String>,
	pub batch_id: Option<String>,
	#[serde(default)]
	pub skip: i64,
	#[serde(default = "default_limit")]
	pub limit: i64,
}

fn default_limit() -> i64 {
	50
}

fn parse_status(raw: &str) -> Option<JobStatus> {
	match raw {
		"pending" => Some(JobStatus::Pending),
		"processing" => Some(JobStatus::Processing),
		"completed" => Some(JobStatus::Completed),
		"failed" => Some(JobStatus::Failed),
		_ => None,
	}
}

/// `GET /jobs` — list/count jobs, optionally filtered by status or batch.
pub async fn list_jobs(State(state): State<AppState>, Query(q): Query<ListJobsQuery>) -> Response {
	let filter = JobFilter {
		status: q.status.as_deref().and_then(parse_status),
		batch_id: q.batch_id.clone(),
		archived: None,
	};
	let jobs = match state
		.store
		.list_jobs(filter.clone(), JobSort::CreatedAtDesc, q.skip, q.limit)
		.await
	{
		Ok(jobs) => jobs,
		Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", &e.to_string()),
	};
	let total = state.store.count_jobs(filter).await.unwrap_or(0);
	Json(json!({"status": "success", "data": {"jobs": jobs, "total": total}})).into_response()
}

/// `GET /jobs/batch/{batch_id}/jobs` — list the jobs belonging to a batch.
pub async fn list_batch_jobs(
	State(state): State<AppState>,
	Path(batch_id): Path<String>,
	Query(q): Query<ListJobsQuery>,
) -> Response {
	let filter = JobFilter {
		status: q.status.as_deref().and_then(parse_status),
		batch_id: Some(batch_id),
		archived: None,
	};
	let jobs = match state
		.store
		.list_jobs(filter.clone(), JobSort::CreatedAtAsc, q.skip, q.limit)
		.await
	{
		Ok(jobs) => jobs,
		Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", &e.to_string()),
	};
	let total = state.store.count_jobs(filter).await.unwrap_or(0);
	Json(json!({"status": "success", "data": {"jobs": jobs, "total": total}})).into_response()
}

/// `GET /jobs/{job_id}/download-archive` — bundle markdown + structured_data
/// into a zip archive. A job still PENDING or PROCESSING returns 202 rather
/// than an error; a terminal job without a markdown result is `NoResults`/
/// `NoMarkdown` at 409.
pub async fn download_archive(
	State(state): State<AppState>,
	Path(job_id): Path<String>,
) -> Response {
	let job = match state.store.get_job(&job_id).await {
		Ok(Some(job)) => job,
		Ok(None) => return error_response(StatusCode::NOT_FOUND, "NotFound", "job not found"),
		Err(e) => {
			return error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", &e.to_string());
		}
	};

	if matches!(job.status, JobStatus::Pending | JobStatus::Processing) {
		return (
			StatusCode::ACCEPTED,
			Json(json!({"status": "processing", "message": "job has not finished processing yet"})),
		)
			.into_response();
	}

	let Some(results) = job.results else {
		return error_response(StatusCode::CONFLICT, "NoResults", "job has no results yet");
	};
	let Some(markdown) = results.markdown_content else {
		return error_response(StatusCode::CONFLICT, "NoMarkdown", "job has no markdown output");
	};

	let mut buf = Vec::new();
	{
		let cursor = std::io::Cursor::new(&mut buf);
		let mut writer = zip::ZipWriter::new(cursor);
		let options: zip::write::FileOptions<()> =
			zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
		if writer.start_file("output.md", options).is_err() {
			return error_response(
				StatusCode::INTERNAL_SERVER_ERROR,
				"ARCHIVE_ERROR",
				"failed to build archive",
			);
		}
		if writer.write_all(markdown.as_bytes()).is_err() {
			return error_response(
				StatusCode::INTERNAL_SERVER_ERROR,
				"ARCHIVE_ERROR",
				"failed to write archive contents",
			);
		}
		if let Some(structured) = &results.structured_data {
			if writer.start_file("structured_data.json", options).is_ok() {
				let _ = writer.write_all(structured.to_string().as_bytes());
			}
		}
		if writer.finish().is_err() {
			return error_response(
				StatusCode::INTERNAL_SERVER_ERROR,
				"ARCHIVE_ERROR",
				"failed to finalize archive",
			);
		}
	}

	(
		StatusCode::OK,
		[
			("Content-Type", "application/zip"),
			(
				"Content-Disposition",
				"attachment; filename=\"job-archive.zip\"",
			),
		],
		buf,
	)
		.into_response()
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
	(
		status,
		Json(json!({"error": {"code": code, "message": message}})),
	)
		.into_response()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::observability::metrics::init_metrics;
	use crate::registry::HandlerRegistry;
	use crate::store::InMemoryJobStore;
	use crate::webhook::WebhookDispatcher;
	use std::sync::Arc;

	fn test_state() -> AppState {
		AppState {
			store: Arc::new(InMemoryJobStore::new()),
			registry: Arc::new(HandlerRegistry::new()),
			webhook: Arc::new(WebhookDispatcher::new()),
			metrics: init_metrics(),
		}
	}

	#[tokio::test]
	async fn create_job_rejects_empty_job_type() {
		let state = test_state();
		let resp = create_job(
			State(state),
			Json(CreateJobRequest {
				job_type: "  ".into(),
				job_name: None,
				parameters: json!({}),
				user_id: None,
				wait_ms: None,
			}),
		)
		.await;
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn get_job_returns_not_found_for_unknown_id() {
		let state = test_state();
		let resp = get_job(State(state), Path("job-missing".into())).await;
		assert_eq!(resp.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn download_archive_requires_results() {
		let state = test_state();
		let created = state
			.store
			.create_job(NewJob {
				job_type: "pdf".into(),
				job_name: None,
				parameters: json!({}),
				batch_id: None,
				user_id: None,
			})
			.await
			.unwrap();
		state
			.store
			.update_job_status(&created.job_id, JobStatus::Completed, None, None, None)
			.await
			.unwrap();
		let resp = download_archive(State(state), Path(created.job_id)).await;
		assert_eq!(resp.status(), StatusCode::CONFLICT);
	}
}
