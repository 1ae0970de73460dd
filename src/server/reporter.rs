//! Snapshot reporting for the introspection endpoint.

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{Result, StatusError};
use crate::process::{self, MemoryUsage};
use crate::record::{WorkerRecord, WorkerStatus};
use crate::server::error::ApiError;
use crate::store::StatusStore;

/// A worker record enriched with memory figures taken at report time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    #[serde(flatten)]
    pub record: WorkerRecord,
    /// Virtual memory size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vss: Option<u64>,
    /// Resident set size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rss: Option<u64>,
}

/// The document served at the introspection path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub workers: Vec<WorkerReport>,
    pub total_accesses: u64,
    pub busy_workers: usize,
    pub idle_workers: usize,
    pub terminated_workers: usize,
}

impl StatusReport {
    /// Combine store records with whatever memory figures are available.
    pub fn from_records(records: Vec<WorkerRecord>, memory: &HashMap<u32, MemoryUsage>) -> Self {
        let mut total_accesses = 0u64;
        let (mut busy, mut idle, mut terminated) = (0, 0, 0);

        let workers = records
            .into_iter()
            .map(|record| {
                total_accesses = total_accesses.saturating_add(record.requests);
                match record.status {
                    WorkerStatus::Busy => busy += 1,
                    WorkerStatus::Idle => idle += 1,
                    WorkerStatus::Terminated(_) => terminated += 1,
                }

                let usage = memory.get(&record.pid);
                if usage.is_none() {
                    debug!(error = %StatusError::ProcessIntrospection(record.pid), "No memory figures");
                }
                WorkerReport {
                    vss: usage.map(|u| u.virtual_bytes),
                    rss: usage.map(|u| u.resident_bytes),
                    record,
                }
            })
            .collect();

        Self {
            workers,
            total_accesses,
            busy_workers: busy,
            idle_workers: idle,
            terminated_workers: terminated,
        }
    }
}

/// Builds [`StatusReport`]s from a store.
#[derive(Debug, Clone)]
pub struct SnapshotReporter {
    store: StatusStore,
}

impl SnapshotReporter {
    pub fn new(store: StatusStore) -> Self {
        Self { store }
    }

    /// Take a locked snapshot and enrich it with live memory usage.
    pub fn report(&self) -> Result<StatusReport> {
        let records = self.store.read_snapshot()?;
        let pids: Vec<u32> = records.iter().map(|r| r.pid).collect();
        let memory = process::memory_usage(&pids);
        Ok(StatusReport::from_records(records, &memory))
    }

    /// Serve the current report as a JSON response.
    ///
    /// Failures still produce a JSON body, with status 500.
    pub fn respond(&self) -> Response {
        let body = self
            .report()
            .and_then(|report| serde_json::to_vec(&report).map_err(StatusError::from));
        match body {
            Ok(body) => json_response(body),
            Err(e) => {
                error!(error = %e, "Failed to build status report");
                ApiError::from(e).into_response()
            }
        }
    }
}

fn json_response(body: Vec<u8>) -> Response {
    let length = body.len();
    let mut response = (StatusCode::OK, Body::from(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    response
}
