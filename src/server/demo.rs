//! The bundled demo application served by workers.
//!
//! `GET` on any path answers a greeting, `POST` echoes the request body.
//! An optional delay keeps requests in flight long enough to watch them.

use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};

const GREETING: &str = "Hello, World!\n";

/// Router for the demo application.
pub fn router(delay: Duration) -> Router {
    Router::new().fallback(handle).with_state(delay)
}

async fn handle(State(delay): State<Duration>, method: Method, body: Bytes) -> Response {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    match method {
        Method::GET | Method::HEAD => GREETING.into_response(),
        Method::POST => body.into_response(),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}
