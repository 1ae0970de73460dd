//! Request tracking middleware.
//!
//! Wraps the application router so that every request moves this worker's
//! record to `busy` before the handler runs and back to `idle` once the
//! response head is available. A local `GET` on the introspection path is
//! answered with the status report instead and never reaches the application.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, header},
    middleware::Next,
    response::Response,
};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::lifecycle::{RequestInfo, WorkerMonitor};
use crate::server::reporter::SnapshotReporter;

/// Path served by the introspection endpoint unless configured otherwise.
pub const DEFAULT_INTROSPECTION_PATH: &str = "/wsgi_status";

/// Shared state for [`status_middleware`].
#[derive(Clone)]
pub struct StatusState {
    monitor: Arc<WorkerMonitor>,
    reporter: SnapshotReporter,
    introspection_path: Arc<str>,
    in_flight: Arc<Semaphore>,
}

impl StatusState {
    pub fn new(monitor: Arc<WorkerMonitor>, introspection_path: &str) -> Self {
        let reporter = SnapshotReporter::new(monitor.store().clone());
        Self {
            monitor,
            reporter,
            introspection_path: Arc::from(introspection_path),
            in_flight: Arc::new(Semaphore::new(1)),
        }
    }

    fn is_local_introspection(&self, request: &Request) -> bool {
        request.method() == Method::GET
            && request.uri().path() == &*self.introspection_path
            && request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .is_some_and(|ConnectInfo(peer)| peer.ip().to_canonical().is_loopback())
    }
}

/// Flips the worker back to idle when dropped.
///
/// Dropped right after the response head is produced, or during unwinding
/// if the handler panics or the request future is cancelled.
struct RequestGuard<'a> {
    monitor: &'a WorkerMonitor,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.monitor.post_request() {
            warn!(error = %e, "Failed to mark worker idle");
        }
    }
}

fn request_info(request: &Request) -> RequestInfo {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default();

    RequestInfo {
        method: request.method().to_string(),
        uri: request.uri().path().to_string(),
        host,
    }
}

/// Track each request in the status store.
///
/// Tracking failures are logged and never fail the request.
pub async fn status_middleware(
    State(state): State<StatusState>,
    request: Request,
    next: Next,
) -> Response {
    if state.is_local_introspection(&request) {
        return state.reporter.respond();
    }

    // One monitored request at a time per worker.
    let _permit = state.in_flight.acquire().await.ok();

    if let Err(e) = state.monitor.pre_request(&request_info(&request)) {
        warn!(error = %e, "Failed to mark worker busy");
    }
    let guard = RequestGuard {
        monitor: &state.monitor,
    };

    let response = next.run(request).await;
    drop(guard);
    response
}
