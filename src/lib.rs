pub mod config;
pub mod devops;
pub mod error;
pub mod handler;
pub mod health;
pub mod ingress;
pub mod model;
pub mod observability;
pub mod registry;
pub mod state;
pub mod store;
pub mod tls_utils;
pub mod webhook;
pub mod worker;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{HeaderName, HeaderValue};
use axum::{
	Router,
	routing::{get, post},
};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::sensitive_headers::{
	SetSensitiveRequestHeadersLayer, SetSensitiveResponseHeadersLayer,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::RequestBodyTimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::registry::HandlerRegistry;
use crate::state::AppState;
use crate::store::{InMemoryJobStore, JobStore, PgJobStore};
use crate::webhook::WebhookDispatcher;
use crate::worker::{WorkerConfig, WorkerManager};

fn build_registry() -> HandlerRegistry {
	let mut registry = HandlerRegistry::new();
	registry.register("pdf", Arc::new(crate::handler::pdf::PdfHandler));
	registry.register("office", Arc::new(crate::handler::office::OfficeHandler));
	registry.register(
		"office_via_pdf",
		Arc::new(crate::handler::office_via_pdf::OfficeViaPdfHandler),
	);
	registry.register("session", Arc::new(crate::handler::session::SessionHandler));
	registry.register("audio", Arc::new(crate::handler::audio::AudioHandler));
	registry.register(
		"transformer_template",
		Arc::new(crate::handler::transformer_template::TransformerTemplateHandler),
	);
	registry
}

fn build_router(state: AppState) -> Router {
	Router::new()
		.route("/jobs", post(crate::ingress::create_job).get(crate::ingress::list_jobs))
		.route("/jobs/batch", post(crate::ingress::create_batch))
		.route("/jobs/batch/{batch_id}", get(crate::ingress::get_batch))
		.route(
			"/jobs/batch/{batch_id}/jobs",
			get(crate::ingress::list_batch_jobs),
		)
		.route("/jobs/{job_id}", get(crate::ingress::get_job))
		.route(
			"/jobs/{job_id}/download-archive",
			get(crate::ingress::download_archive),
		)
		.route("/health", get(|| async { "OK" }))
		.route("/health/db", get(crate::health::db_health))
		.route(
			"/metrics",
			get(|axum::extract::State(state): axum::extract::State<AppState>| async move {
				state.metrics.encode()
			}),
		)
		.layer(TraceLayer::new_for_http())
		.layer(NormalizePathLayer::trim_trailing_slash())
		.layer(SetResponseHeaderLayer::if_not_present(
			HeaderName::from_static("strict-transport-security"),
			HeaderValue::from_static("max-age=63072000; includeSubDomains; preload"),
		))
		.layer(SetResponseHeaderLayer::if_not_present(
			HeaderName::from_static("x-frame-options"),
			HeaderValue::from_static("DENY"),
		))
		.layer(SetResponseHeaderLayer::if_not_present(
			HeaderName::from_static("x-content-type-options"),
			HeaderValue::from_static("nosniff"),
		))
		.layer(SetResponseHeaderLayer::if_not_present(
			HeaderName::from_static("referrer-policy"),
			HeaderValue::from_static("strict-origin-when-cross-origin"),
		))
		.layer(SetResponseHeaderLayer::if_not_present(
			HeaderName::from_static("permissions-policy"),
			HeaderValue::from_static("geolocation=(), microphone=()"),
		))
		.with_state(state)
}

/// Assemble the job store, handler registry, webhook dispatcher, and worker
/// fleet, then serve the HTTP surface. Logs errors rather than returning
/// them so the `main` runner can call it without changing its signature.
///
/// Connects to Postgres when `database_url` is configured, retrying with
/// backoff; otherwise falls back to an in-memory store, useful for local
/// development without a database.
pub async fn run() {
	let obs_state = match crate::observability::init_observability().await {
		Ok(s) => s,
		Err(e) => {
			eprintln!("warning: failed to initialize observability: {}", e);
			crate::observability::ObservabilityState::default()
		}
	};

	let settings = match crate::config::load() {
		Ok(s) => s,
		Err(e) => {
			eprintln!("warning: failed to load config: {}", e);
			crate::config::Settings::default()
		}
	};

	let store: Arc<dyn JobStore> = match &settings.database_url {
		Some(url) => match PgJobStore::connect(url, 10, 1000).await {
			Ok(store) => {
				if let Err(e) = store.ensure_schema().await {
					eprintln!("failed to ensure job store schema: {}", e);
					return;
				}
				Arc::new(store)
			}
			Err(e) => {
				eprintln!("failed to connect to job store database: {}", e);
				return;
			}
		},
		None => {
			log::warn!("JOBS_DATABASE_URL not configured; using an in-memory job store");
			Arc::new(InMemoryJobStore::new())
		}
	};

	let registry = Arc::new(build_registry());
	let webhook = Arc::new(WebhookDispatcher::new().with_metrics(Arc::clone(&obs_state.metrics)));

	let app_state = AppState {
		store: Arc::clone(&store),
		registry: Arc::clone(&registry),
		webhook: Arc::clone(&webhook),
		metrics: Arc::clone(&obs_state.metrics),
	};

	let worker_manager = WorkerManager::new(
		store,
		registry,
		webhook,
		WorkerConfig {
			max_concurrent_workers: settings.max_concurrent_workers,
			poll_interval: Duration::from_secs(settings.poll_interval_seconds),
			stall_check_interval: Duration::from_secs(settings.stall_check_interval_seconds),
			max_processing_minutes: settings.max_processing_minutes,
		},
	)
	.with_metrics(Arc::clone(&obs_state.metrics));
	worker_manager.start();

	let app = build_router(app_state);

	let bind_addr: SocketAddr = match format!("{}:{}", settings.host, settings.port).parse() {
		Ok(a) => a,
		Err(e) => {
			eprintln!("invalid listen address: {}", e);
			return;
		}
	};

	match (&settings.tls_cert, &settings.tls_key) {
		(Some(cert_path), Some(key_path)) => {
			serve_tls(app, &settings, bind_addr, cert_path, key_path).await
		}
		_ => serve_plain(app, bind_addr).await,
	}
}

/// Serve over plain HTTP. Used when no TLS material is configured (local
/// development, or when TLS is terminated upstream by a proxy/load balancer).
async fn serve_plain(app: Router, bind_addr: SocketAddr) {
	let listener = match TcpListener::bind(bind_addr).await {
		Ok(l) => l,
		Err(e) => {
			eprintln!("failed to bind {}: {}", bind_addr, e);
			return;
		}
	};

	println!("job orchestrator listening on http://{}", bind_addr);

	if let Err(e) = axum::serve(listener, app).await {
		eprintln!("server error: {}", e);
	}
}

/// Serve over hardened TLS 1.3, rejecting self-signed leaf certificates and
/// checking hostname/expiry before binding, via a manual hyper+rustls
/// accept loop.
async fn serve_tls(
	app: Router,
	settings: &crate::config::Settings,
	bind_addr: SocketAddr,
	cert_path: &str,
	key_path: &str,
) {
	let certs = match tls_utils::load_certs(Path::new(cert_path)) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("failed to load TLS certs ({}). Serving disabled.", e);
			return;
		}
	};
	let key = match tls_utils::load_private_key(Path::new(key_path)) {
		Ok(k) => k,
		Err(e) => {
			eprintln!("failed to load TLS private key ({}). Serving disabled.", e);
			return;
		}
	};

	if certs.is_empty() {
		eprintln!("no TLS certificates loaded; serving disabled");
		return;
	}

	let leaf = &certs[0];
	match tls_utils::is_cert_expired(leaf) {
		Ok(true) => {
			eprintln!("TLS certificate appears to be expired; serving disabled");
			return;
		}
		Err(e) => {
			eprintln!(
				"failed to evaluate TLS certificate expiry ({}); serving disabled",
				e
			);
			return;
		}
		_ => {}
	}

	let host_to_check = settings.host.clone();
	if !host_to_check.is_empty() {
		let mut matched = false;
		if let Ok(sans) = tls_utils::dns_names_from_cert(leaf) {
			if sans.iter().any(|s| s == &host_to_check) {
				matched = true;
			}
		}
		if !matched {
			if let Ok(Some(cn)) = tls_utils::first_common_name(leaf) {
				if cn == host_to_check {
					matched = true;
				}
			}
		}
		if !matched {
			eprintln!(
				"TLS certificate does not contain configured host '{}' in CN or SAN; serving disabled",
				host_to_check
			);
			return;
		}
	}

	let server_cfg = match tls_utils::build_server_config_tls13(certs, key) {
		Ok(cfg) => cfg,
		Err(e) => {
			eprintln!("failed to build TLS server config: {}", e);
			return;
		}
	};

	let acceptor = TlsAcceptor::from(server_cfg);

	let listener = match TcpListener::bind(bind_addr).await {
		Ok(l) => l,
		Err(e) => {
			eprintln!("failed to bind {}: {}", bind_addr, e);
			return;
		}
	};

	println!("job orchestrator listening on https://{}", bind_addr);

	let rate_limit_burst = settings.rate_limit_burst;
	let rate_limit_rps = settings.rate_limit_rps;

	loop {
		let (tcp_stream, peer_addr) = match listener.accept().await {
			Ok(t) => t,
			Err(e) => {
				eprintln!("accept error: {}", e);
				tokio::time::sleep(Duration::from_millis(100)).await;
				continue;
			}
		};

		let acceptor = acceptor.clone();
		let app = app.clone();

		tokio::spawn(async move {
			let _ = tcp_stream.set_nodelay(true);

			let tls_stream = match acceptor.accept(tcp_stream).await {
				Ok(s) => s,
				Err(e) => {
					eprintln!("TLS handshake failed ({}): {}", peer_addr, e);
					return;
				}
			};

			let req_headers: Arc<[HeaderName]> = Arc::from(
				vec![
					HeaderName::from_static("authorization"),
					HeaderName::from_static("cookie"),
				]
				.into_boxed_slice(),
			);
			let res_headers: Arc<[HeaderName]> =
				Arc::from(vec![HeaderName::from_static("set-cookie")].into_boxed_slice());

			let svc = ServiceBuilder::new()
				.layer(CatchPanicLayer::new())
				.concurrency_limit(100)
				.load_shed()
				.timeout(Duration::from_secs(30))
				.layer(RequestBodyLimitLayer::new(10 * 1024 * 1024))
				.layer(RequestBodyTimeoutLayer::new(Duration::from_secs(30)))
				.layer(crate::devops::SharedRateLimitLayer::new(
					rate_limit_burst,
					rate_limit_rps,
				))
				.layer(SetSensitiveRequestHeadersLayer::from_shared(req_headers.clone()))
				.layer(SetSensitiveResponseHeadersLayer::from_shared(res_headers.clone()))
				.service(app.into_service());

			let hyper_svc = TowerToHyperService::new(svc);
			let io = TokioIo::new(tls_stream);
			let builder = AutoBuilder::new(TokioExecutor::new());
			let conn = builder.serve_connection(io, hyper_svc);

			if let Err(err) = conn.await {
				eprintln!("connection error ({}): {}", peer_addr, err);
			}
		});
	}
}
