//! Per-process worker registration and state transitions.
//!
//! A [`WorkerMonitor`] owns exactly one record in the status store: the one
//! keyed by its own pid. It registers that record at startup and afterwards
//! moves it through `idle -> busy -> idle` around requests, until a signal
//! stamps it as terminated. Terminated records are never touched again by
//! the request hooks.

use std::path::Path;
use std::time::SystemTime;

use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

use crate::error::{Result, StatusError};
use crate::process;
use crate::record::{WorkerRecord, WorkerStatus, epoch_secs, upsert};
use crate::store::StatusStore;

/// The parts of an inbound request recorded while it is in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub uri: String,
    pub host: String,
}

/// Owner of this process's record in the status store.
#[derive(Debug)]
pub struct WorkerMonitor {
    pid: u32,
    last_spawn: u64,
    store: StatusStore,
}

impl WorkerMonitor {
    /// Start monitoring the current process.
    ///
    /// Refuses to run when more than one thread is active, resolves the
    /// parent's creation time to decide whether the store is stale, then
    /// registers this process as idle.
    pub fn start(status_file: &Path) -> Result<Self> {
        if let Some(threads) = process::active_thread_count()
            && threads > 1
        {
            return Err(StatusError::Threading { threads });
        }

        let parent_created = process::parent_start_time()?;
        let store = StatusStore::open_or_reset(status_file, parent_created)?;
        Self::register(store, std::process::id())
    }

    /// Register `pid` as a fresh idle worker, replacing any stale record it left behind.
    pub fn register(store: StatusStore, pid: u32) -> Result<Self> {
        let last_spawn = epoch_secs(SystemTime::now());
        store.with_exclusive_access(|mut records| {
            upsert(&mut records, WorkerRecord::new(pid, last_spawn));
            records
        })?;

        info!(pid, path = %store.path().display(), "Registered worker");
        Ok(Self {
            pid,
            last_spawn,
            store,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Mark this worker busy with `request`.
    pub fn pre_request(&self, request: &RequestInfo) -> Result<()> {
        self.update_own(|record| {
            if record.status.is_terminated() {
                return;
            }
            record.requests += 1;
            record.status = WorkerStatus::Busy;
            record.method.clone_from(&request.method);
            record.uri.clone_from(&request.uri);
            record.host.clone_from(&request.host);
        })
    }

    /// Mark this worker idle again.
    pub fn post_request(&self) -> Result<()> {
        self.update_own(|record| {
            if record.status.is_terminated() {
                return;
            }
            record.status = WorkerStatus::Idle;
            record.clear_request();
        })
    }

    /// Stamp this worker as terminated by `signal`.
    ///
    /// Overwrites whatever status is present.
    pub fn mark_terminated(&self, signal: Signal) -> Result<()> {
        self.update_own(|record| {
            record.status = WorkerStatus::Terminated(signal as i32);
            record.clear_request();
        })
    }

    fn update_own<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut WorkerRecord),
    {
        let pid = self.pid;
        let last_spawn = self.last_spawn;
        self.store.with_exclusive_access(|mut records| {
            match records.iter_mut().find(|r| r.pid == pid) {
                Some(record) => apply(record),
                None => {
                    // Usually a concurrent reset by a newer generation.
                    warn!(error = %StatusError::RecordNotFound(pid), "Re-registering worker");
                    let mut record = WorkerRecord::new(pid, last_spawn);
                    apply(&mut record);
                    records.push(record);
                }
            }
            records
        })?;
        debug!(pid, "Updated worker record");
        Ok(())
    }
}
