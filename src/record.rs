//! Worker records as persisted in the status file.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// What a worker is doing right now.
///
/// Serialized as `"idle"`, `"busy"`, or the decimal number of the signal
/// that terminated the worker (e.g. `"15"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum WorkerStatus {
    Idle,
    Busy,
    /// Stamped by the signal interceptor. Never left once entered.
    Terminated(i32),
}

impl WorkerStatus {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Busy => write!(f, "busy"),
            Self::Terminated(signum) => write!(f, "{}", signum),
        }
    }
}

impl FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "busy" => Ok(Self::Busy),
            other => other
                .parse::<i32>()
                .map(Self::Terminated)
                .map_err(|_| format!("unknown worker status: '{}'", other)),
        }
    }
}

impl From<WorkerStatus> for String {
    fn from(status: WorkerStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for WorkerStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One entry per live (or last-known) worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub pid: u32,
    pub requests: u64,
    pub status: WorkerStatus,
    /// Registration time, epoch seconds.
    pub last_spawn: u64,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub uri: String,
}

impl WorkerRecord {
    /// A freshly registered, idle worker.
    pub fn new(pid: u32, last_spawn: u64) -> Self {
        Self {
            pid,
            requests: 0,
            status: WorkerStatus::Idle,
            last_spawn,
            host: String::new(),
            method: String::new(),
            uri: String::new(),
        }
    }

    /// Forget the in-flight request.
    pub fn clear_request(&mut self) {
        self.host.clear();
        self.method.clear();
        self.uri.clear();
    }
}

/// The full status file document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub workers: Vec<WorkerRecord>,
}

/// Insert `record`, replacing the first entry with the same pid in place.
///
/// Any further entries sharing that pid are dropped, so the sequence holds
/// at most one record per pid afterwards.
pub fn upsert(records: &mut Vec<WorkerRecord>, record: WorkerRecord) {
    let pid = record.pid;
    match records.iter().position(|r| r.pid == pid) {
        Some(idx) => {
            records[idx] = record;
            let mut seen = false;
            records.retain(|r| {
                if r.pid != pid {
                    return true;
                }
                let keep = !seen;
                seen = true;
                keep
            });
        }
        None => records.push(record),
    }
}

/// Current time in whole epoch seconds.
pub fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_as_strings() {
        assert_eq!(serde_json::to_string(&WorkerStatus::Idle).unwrap(), "\"idle\"");
        assert_eq!(serde_json::to_string(&WorkerStatus::Busy).unwrap(), "\"busy\"");
        assert_eq!(
            serde_json::to_string(&WorkerStatus::Terminated(15)).unwrap(),
            "\"15\""
        );
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("idle".parse::<WorkerStatus>().unwrap(), WorkerStatus::Idle);
        assert_eq!("busy".parse::<WorkerStatus>().unwrap(), WorkerStatus::Busy);
        assert_eq!(
            "6".parse::<WorkerStatus>().unwrap(),
            WorkerStatus::Terminated(6)
        );
        assert!("sleeping".parse::<WorkerStatus>().is_err());
    }

    #[test]
    fn test_record_wire_format() {
        let mut record = WorkerRecord::new(100, 1_700_000_000);
        record.requests = 3;
        record.status = WorkerStatus::Busy;
        record.method = "GET".to_string();
        record.uri = "/foo".to_string();

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["pid"], 100);
        assert_eq!(value["requests"], 3);
        assert_eq!(value["status"], "busy");
        assert_eq!(value["last_spawn"], 1_700_000_000u64);
        assert_eq!(value["method"], "GET");
        assert_eq!(value["uri"], "/foo");
        assert!(value.get("vss").is_none());
        assert!(value.get("rss").is_none());
    }

    #[test]
    fn test_document_tolerates_missing_request_fields() {
        let doc: StoreDocument = serde_json::from_str(
            r#"{"workers": [{"pid": 7, "requests": 1, "status": "idle", "last_spawn": 5}]}"#,
        )
        .unwrap();
        assert_eq!(doc.workers.len(), 1);
        assert!(doc.workers[0].uri.is_empty());
    }

    #[test]
    fn test_upsert_appends_on_first_sight() {
        let mut records = vec![WorkerRecord::new(1, 0)];
        upsert(&mut records, WorkerRecord::new(2, 0));
        assert_eq!(records.iter().map(|r| r.pid).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut records = vec![
            WorkerRecord::new(1, 0),
            WorkerRecord::new(2, 0),
            WorkerRecord::new(3, 0),
        ];
        let mut replacement = WorkerRecord::new(2, 99);
        replacement.requests = 10;
        upsert(&mut records, replacement);

        assert_eq!(records.iter().map(|r| r.pid).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(records[1].requests, 10);
        assert_eq!(records[1].last_spawn, 99);
    }

    #[test]
    fn test_upsert_collapses_duplicates() {
        let mut records = vec![
            WorkerRecord::new(5, 0),
            WorkerRecord::new(6, 0),
            WorkerRecord::new(5, 1),
        ];
        upsert(&mut records, WorkerRecord::new(5, 2));

        let fives: Vec<_> = records.iter().filter(|r| r.pid == 5).collect();
        assert_eq!(fives.len(), 1);
        assert_eq!(fives[0].last_spawn, 2);
        assert_eq!(records[0].pid, 5);
    }
}
