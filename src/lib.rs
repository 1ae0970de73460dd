//! workstat - cross-process worker status registry.
//!
//! Pre-forked HTTP workers record what they are doing (idle, busy with a
//! request, or terminated by a signal) in a single JSON file guarded by an
//! advisory lock. Any process can take a consistent snapshot of every
//! worker at any time, and each worker serves that snapshot, enriched with
//! memory usage, to local callers on an introspection path.
//!
//! ```no_run
//! use std::sync::Arc;
//! use workstat::{RequestInfo, WorkerMonitor};
//!
//! # fn main() -> workstat::Result<()> {
//! let monitor = Arc::new(WorkerMonitor::start("/run/workstat/status.json".as_ref())?);
//! monitor.pre_request(&RequestInfo {
//!     method: "GET".into(),
//!     uri: "/foo".into(),
//!     host: "localhost".into(),
//! })?;
//! monitor.post_request()?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod output;
pub mod paths;
pub mod process;
pub mod record;
pub mod server;
pub mod signals;
pub mod store;
pub mod supervisor;
pub mod theme;
pub mod version;

pub use error::{Result, StatusError};
pub use lifecycle::{RequestInfo, WorkerMonitor};
pub use record::{WorkerRecord, WorkerStatus};
pub use store::StatusStore;
