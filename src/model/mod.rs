//! Job/batch data model: the persisted shape orchestrated by [`crate::store`]
//! and [`crate::worker`]. Mirrors the dataclass shapes of the system this
//! crate generalizes, but expressed as serde-derived Rust types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Status transitions form the DAG PENDING -> PROCESSING -> {COMPLETED, FAILED}.
/// A stall sweep may force PROCESSING -> FAILED; no other transition is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	Pending,
	Processing,
	Completed,
	Failed,
}

impl JobStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, JobStatus::Completed | JobStatus::Failed)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			JobStatus::Pending => "pending",
			JobStatus::Processing => "processing",
			JobStatus::Completed => "completed",
			JobStatus::Failed => "failed",
		}
	}
}

/// Closed set of log levels. An invalid level on input is coerced to `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Debug,
	Info,
	Warning,
	Error,
	Critical,
}

impl LogLevel {
	/// Parse a free-form string into a valid level, coercing anything
	/// unrecognized to `Info` rather than rejecting the log call.
	pub fn coerce(raw: &str) -> Self {
		match raw.to_ascii_lowercase().as_str() {
			"debug" => LogLevel::Debug,
			"info" => LogLevel::Info,
			"warning" | "warn" => LogLevel::Warning,
			"error" => LogLevel::Error,
			"critical" => LogLevel::Critical,
			_ => LogLevel::Info,
		}
	}
}

/// An immutable append-only log record. `log_entries` on a job never mutates
/// or removes an entry once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
	pub timestamp: DateTime<Utc>,
	pub level: LogLevel,
	pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessVisibility {
	Private,
	Public,
}

/// Inert access-control record carried on jobs/batches. Authentication and
/// enforcement are out of scope for this crate; this is pure data that
/// round-trips so downstream systems that do enforce it see a stable shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControl {
	pub visibility: AccessVisibility,
	#[serde(default)]
	pub read_access: Vec<String>,
	#[serde(default)]
	pub write_access: Vec<String>,
	#[serde(default)]
	pub admin_access: Vec<String>,
}

impl Default for AccessControl {
	fn default() -> Self {
		Self {
			visibility: AccessVisibility::Private,
			read_access: Vec::new(),
			write_access: Vec::new(),
			admin_access: Vec::new(),
		}
	}
}

impl AccessControl {
	/// Private visibility with `user_id` granted read/write/admin, matching
	/// `Job.__post_init__`'s auto-stamping of access control for owned jobs.
	pub fn owned_by(user_id: &str) -> Self {
		Self {
			visibility: AccessVisibility::Private,
			read_access: vec![user_id.to_string()],
			write_access: vec![user_id.to_string()],
			admin_access: vec![user_id.to_string()],
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
	pub step: String,
	#[serde(default)]
	pub percent: u8,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl JobProgress {
	pub fn new(step: impl Into<String>, percent: u8, message: Option<String>) -> Self {
		Self {
			step: step.into(),
			percent: percent.min(100),
			message,
		}
	}
}

/// Handler-agnostic results envelope. Handler-specific payload lives under
/// `structured_data`, which consumers treat opaquely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResults {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub markdown_file: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub markdown_content: Option<String>,
	#[serde(default)]
	pub assets: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub structured_data: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target_dir: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub asset_dir: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub archive_filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
	pub code: String,
	pub message: String,
	#[serde(default)]
	pub details: HashMap<String, Value>,
}

impl JobError {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			code: code.into(),
			message: message.into(),
			details: HashMap::new(),
		}
	}

	pub fn with_details(mut self, details: HashMap<String, Value>) -> Self {
		self.details = details;
		self
	}
}

/// `{ url, token?, jobId? }` embedded in `parameters.webhook`. `jobId` is the
/// client-side identifier echoed back in callback payloads, distinct from
/// the internal `job_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	#[serde(rename = "jobId")]
	pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
	pub job_id: String,
	pub job_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub job_name: Option<String>,
	pub status: JobStatus,
	pub parameters: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub progress: Option<JobProgress>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub results: Option<JobResults>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<JobError>,
	#[serde(default)]
	pub log_entries: Vec<LogEntry>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub processing_started_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_control: Option<AccessControl>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub batch_id: Option<String>,
	#[serde(default)]
	pub archived: bool,
}

impl Job {
	/// Derive a `job_name` from parameters when the client didn't supply
	/// one, joining `event - track - session` from whichever of those keys
	/// are present.
	pub fn derive_job_name(job_type: &str, parameters: &Value) -> Option<String> {
		let parts: Vec<String> = ["event", "track", "session"]
			.iter()
			.filter_map(|key| parameters.get(key).and_then(Value::as_str))
			.filter(|s| !s.is_empty())
			.map(|s| s.to_string())
			.collect();
		if parts.is_empty() {
			if let Some(filename) = parameters.get("filename").and_then(Value::as_str) {
				return Some(format!("{job_type}: {filename}"));
			}
			None
		} else {
			Some(parts.join(" - "))
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
	pub batch_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub batch_name: Option<String>,
	pub status: JobStatus,
	pub total_jobs: i64,
	#[serde(default)]
	pub completed_jobs: i64,
	#[serde(default)]
	pub failed_jobs: i64,
	#[serde(default)]
	pub pending_jobs: i64,
	#[serde(default)]
	pub processing_jobs: i64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_control: Option<AccessControl>,
	#[serde(default)]
	pub archived: bool,
	#[serde(default = "default_true")]
	pub is_active: bool,
}

fn default_true() -> bool {
	true
}

/// Input to `JobStore::create_job`.
#[derive(Debug, Clone)]
pub struct NewJob {
	pub job_type: String,
	pub job_name: Option<String>,
	pub parameters: Value,
	pub batch_id: Option<String>,
	pub user_id: Option<String>,
}

/// Input to `JobStore::create_batch`.
#[derive(Debug, Clone)]
pub struct NewBatch {
	pub total_jobs: i64,
	pub batch_name: Option<String>,
	pub user_id: Option<String>,
}

/// Sort order for `JobStore::list_jobs`. FIFO by `created_at` is the only
/// ordering the orchestrator relies on; `Newest` exists for the HTTP listing
/// surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSort {
	CreatedAtAsc,
	CreatedAtDesc,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
	pub status: Option<JobStatus>,
	pub batch_id: Option<String>,
	pub archived: Option<bool>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn derive_job_name_from_parts() {
		let params = serde_json::json!({"event": "FOSDEM", "track": "Rust"});
		assert_eq!(
			Job::derive_job_name("session", &params),
			Some("FOSDEM - Rust".to_string())
		);
	}

	#[test]
	fn derive_job_name_falls_back_to_filename() {
		let params = serde_json::json!({"filename": "/tmp/in.pdf"});
		assert_eq!(
			Job::derive_job_name("pdf", &params),
			Some("pdf: /tmp/in.pdf".to_string())
		);
	}

	#[test]
	fn log_level_coerces_unknown_to_info() {
		assert!(matches!(LogLevel::coerce("trace"), LogLevel::Info));
		assert!(matches!(LogLevel::coerce("ERROR"), LogLevel::Error));
	}

	#[test]
	fn job_status_terminal() {
		assert!(JobStatus::Completed.is_terminal());
		assert!(JobStatus::Failed.is_terminal());
		assert!(!JobStatus::Processing.is_terminal());
		assert!(!JobStatus::Pending.is_terminal());
	}
}
