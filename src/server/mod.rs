//! HTTP worker for workstat.
//!
//! A worker serves the demo application behind the status middleware on a
//! listener it inherited (from the supervisor) or bound itself.
//!
//! # Example
//!
//! ```bash
//! # Run a single worker
//! workstat worker --bind 127.0.0.1:8080
//!
//! # Inspect it from the same host
//! curl http://127.0.0.1:8080/wsgi_status
//! ```

pub mod demo;
pub mod error;
pub mod middleware;
pub mod reporter;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::Result;
use crate::lifecycle::WorkerMonitor;
use crate::signals::SignalInterceptor;

pub use middleware::{DEFAULT_INTROSPECTION_PATH, StatusState, status_middleware};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Path to the shared status file.
    pub status_file: PathBuf,
    /// Path answered with the status report for local callers.
    pub introspection_path: String,
    /// Artificial delay added to every demo response.
    pub delay: Duration,
}

impl WorkerConfig {
    pub fn new(status_file: PathBuf) -> Self {
        Self {
            status_file,
            introspection_path: DEFAULT_INTROSPECTION_PATH.to_string(),
            delay: Duration::ZERO,
        }
    }
}

/// Wrap `app` in request tracking and tracing.
pub fn build_router(app: Router, state: StatusState) -> Router {
    app.layer(axum::middleware::from_fn_with_state(state, status_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Run one worker process on `listener` until a termination signal arrives.
///
/// Must be called while the process is still single-threaded: the status
/// monitor refuses to start otherwise, and the runtime built here never
/// spawns additional threads.
pub fn run_worker(listener: std::net::TcpListener, config: &WorkerConfig) -> Result<()> {
    let _span = tracing::info_span!("worker", pid = std::process::id()).entered();

    let monitor = Arc::new(WorkerMonitor::start(&config.status_file)?);
    let interceptor = SignalInterceptor::install(Arc::clone(&monitor))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(listener, monitor, interceptor, config))
}

async fn serve(
    listener: std::net::TcpListener,
    monitor: Arc<WorkerMonitor>,
    interceptor: SignalInterceptor,
    config: &WorkerConfig,
) -> Result<()> {
    listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(listener)?;
    let addr = listener.local_addr()?;

    let state = StatusState::new(monitor, &config.introspection_path);
    let app = build_router(demo::router(config.delay), state);
    info!(%addr, path = %config.introspection_path, "Worker accepting requests");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    tokio::select! {
        result = server.into_future() => result?,
        result = interceptor.run() => result?,
    }
    Ok(())
}
