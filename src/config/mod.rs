use anyhow::Result;
use serde::Deserialize;

/// Runtime configuration for JobForge.
///
/// Values are loaded from (in order): `config` file (optional) and
/// environment variables prefixed with `JOBS_` (e.g. `JOBS_PORT`). This is a
/// small, intentionally conservative bootstrap layering the `config` crate
/// with an explicit env overlay.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
	pub host: String,
	pub port: u16,
	pub database_url: Option<String>,
	pub tls_cert: Option<String>,
	pub tls_key: Option<String>,
	pub log_level: Option<String>,
	/// Worker fleet size: maximum PROCESSING jobs at once.
	pub max_concurrent_workers: usize,
	/// How often the worker loop checks for newly-PENDING jobs.
	pub poll_interval_seconds: u64,
	/// How often the stall sweep runs.
	pub stall_check_interval_seconds: u64,
	/// A PROCESSING job older than this is force-failed by the stall sweep.
	pub max_processing_minutes: i64,
	/// Rate-limiter burst/refill.
	pub rate_limit_burst: usize,
	pub rate_limit_rps: u32,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: 8443,
			database_url: None,
			tls_cert: None,
			tls_key: None,
			log_level: Some("info".to_string()),
			max_concurrent_workers: 4,
			poll_interval_seconds: 2,
			stall_check_interval_seconds: 60,
			max_processing_minutes: 10,
			rate_limit_burst: 50,
			rate_limit_rps: 10,
		}
	}
}

/// Partial settings used to overlay environment/file values on top of defaults.
#[derive(Debug, Deserialize)]
struct PartialSettings {
	host: Option<String>,
	port: Option<u16>,
	database_url: Option<String>,
	tls_cert: Option<String>,
	tls_key: Option<String>,
	log_level: Option<String>,
	max_concurrent_workers: Option<usize>,
	poll_interval_seconds: Option<u64>,
	stall_check_interval_seconds: Option<u64>,
	max_processing_minutes: Option<i64>,
	rate_limit_burst: Option<usize>,
	rate_limit_rps: Option<u32>,
}

/// Load settings from config file (optional) and environment variables.
pub fn load() -> Result<Settings> {
	let builder = config::Config::builder()
		.add_source(config::File::with_name("config").required(false))
		// Use a double-underscore separator so single-underscore env names like
		// `JOBS_DATABASE_URL` map to `database_url` instead of nested `database.url`.
		.add_source(config::Environment::with_prefix("JOBS").separator("__"));

	let cfg = builder.build()?;

	let partial: PartialSettings = cfg.try_deserialize()?;

	let mut s = Settings::default();
	if let Some(host) = partial.host {
		s.host = host;
	}
	if let Some(port) = partial.port {
		s.port = port;
	}
	if let Some(db) = partial.database_url {
		s.database_url = Some(db);
	}
	if let Some(cert) = partial.tls_cert {
		s.tls_cert = Some(cert);
	}
	if let Some(key) = partial.tls_key {
		s.tls_key = Some(key);
	}
	if let Some(level) = partial.log_level {
		s.log_level = Some(level);
	}
	if let Some(v) = partial.max_concurrent_workers {
		s.max_concurrent_workers = v;
	}
	if let Some(v) = partial.poll_interval_seconds {
		s.poll_interval_seconds = v;
	}
	if let Some(v) = partial.stall_check_interval_seconds {
		s.stall_check_interval_seconds = v;
	}
	if let Some(v) = partial.max_processing_minutes {
		s.max_processing_minutes = v;
	}
	if let Some(v) = partial.rate_limit_burst {
		s.rate_limit_burst = v;
	}
	if let Some(v) = partial.rate_limit_rps {
		s.rate_limit_rps = v;
	}

	// Explicitly prefer direct environment variables when present. Some
	// environments (CI, test harnesses) may set env vars in ways that the
	// `config` crate doesn't map as expected; read them directly to ensure
	// explicit overrides take effect.
	if let Ok(h) = std::env::var("JOBS_HOST") {
		if !h.is_empty() {
			s.host = h;
		}
	}
	if let Ok(p) = std::env::var("JOBS_PORT") {
		if let Ok(pn) = p.parse::<u16>() {
			s.port = pn;
		}
	}
	if let Ok(db) = std::env::var("JOBS_DATABASE_URL") {
		if !db.is_empty() {
			s.database_url = Some(db);
		}
	}
	if let Ok(c) = std::env::var("JOBS_TLS_CERT") {
		if !c.is_empty() {
			s.tls_cert = Some(c);
		}
	}
	if let Ok(k) = std::env::var("JOBS_TLS_KEY") {
		if !k.is_empty() {
			s.tls_key = Some(k);
		}
	}
	if let Ok(l) = std::env::var("JOBS_LOG_LEVEL") {
		if !l.is_empty() {
			s.log_level = Some(l);
		}
	}
	if let Ok(v) = std::env::var("JOBS_MAX_CONCURRENT_WORKERS") {
		if let Ok(n) = v.parse() {
			s.max_concurrent_workers = n;
		}
	}
	if let Ok(v) = std::env::var("JOBS_POLL_INTERVAL_SECONDS") {
		if let Ok(n) = v.parse() {
			s.poll_interval_seconds = n;
		}
	}
	if let Ok(v) = std::env::var("JOBS_STALL_CHECK_INTERVAL_SECONDS") {
		if let Ok(n) = v.parse() {
			s.stall_check_interval_seconds = n;
		}
	}
	if let Ok(v) = std::env::var("JOBS_MAX_PROCESSING_MINUTES") {
		if let Ok(n) = v.parse() {
			s.max_processing_minutes = n;
		}
	}

	Ok(s)
}

#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use std::env;

	#[test]
	fn test_load_defaults_and_env_overlay() {
		let orig_host = env::var_os("JOBS_HOST");
		let orig_port = env::var_os("JOBS_PORT");
		let orig_workers = env::var_os("JOBS_MAX_CONCURRENT_WORKERS");

		unsafe { env::remove_var("JOBS_HOST") };
		unsafe { env::remove_var("JOBS_PORT") };
		unsafe { env::remove_var("JOBS_MAX_CONCURRENT_WORKERS") };

		let s = load().expect("load should succeed with defaults");
		let d = Settings::default();
		assert_eq!(s.host, d.host);
		assert_eq!(s.port, d.port);
		assert_eq!(s.max_concurrent_workers, d.max_concurrent_workers);

		unsafe { env::set_var("JOBS_HOST", "0.0.0.0") };
		unsafe { env::set_var("JOBS_PORT", "9443") };
		unsafe { env::set_var("JOBS_MAX_CONCURRENT_WORKERS", "16") };

		let s2 = load().expect("load should succeed with env");
		assert_eq!(s2.host, "0.0.0.0");
		assert_eq!(s2.port, 9443u16);
		assert_eq!(s2.max_concurrent_workers, 16);

		match orig_host {
			Some(v) => unsafe { env::set_var("JOBS_HOST", v) },
			None => unsafe { env::remove_var("JOBS_HOST") },
		}
		match orig_port {
			Some(v) => unsafe { env::set_var("JOBS_PORT", v) },
			None => unsafe { env::remove_var("JOBS_PORT") },
		}
		match orig_workers {
			Some(v) => unsafe { env::set_var("JOBS_MAX_CONCURRENT_WORKERS", v) },
			None => unsafe { env::remove_var("JOBS_MAX_CONCURRENT_WORKERS") },
		}
	}
}
