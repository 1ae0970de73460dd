//! HTTP client for a running worker's introspection endpoint.
//!
//! Used by `workstat status --url ...` as an alternative to reading the
//! status file directly. The endpoint only answers loopback callers.

use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::{Result, StatusError};
use crate::server::reporter::StatusReport;

/// Default introspection URL.
pub const DEFAULT_STATUS_URL: &str = "http://127.0.0.1:8080/wsgi_status";

/// Blocking client for the introspection endpoint.
pub struct StatusClient {
    url: String,
    client: Client,
}

impl StatusClient {
    /// Create a client for the full introspection URL.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(StatusError::Network)?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the current status report.
    pub fn fetch(&self) -> Result<StatusReport> {
        self.get(&self.url)
    }

    /// Perform a GET request and parse the JSON response.
    fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().map_err(StatusError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::Api {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.json().map_err(StatusError::Network)
    }
}
