//! File-backed worker status store.
//!
//! The status file is the only state shared between worker processes. Every
//! access goes through an advisory, whole-file exclusive lock (`flock` via
//! fs2): mutations read the full document, apply a closure and rewrite the
//! file before the lock is released, and snapshot reads take the very same
//! lock. Nothing else in the crate opens the file.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fs2::FileExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, StatusError};
use crate::record::{StoreDocument, WorkerRecord};

/// Group write bit, granted so sibling workers in the same group can mutate the file.
const GROUP_WRITE: u32 = 0o020;

/// Handle to the shared status file.
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    /// Open the store at `path`, resetting it when it belongs to an older generation.
    ///
    /// The file is (re)written as an empty document when it is missing, empty,
    /// or was last modified before `parent_created` (the supervisor's creation
    /// time). The check and the reset happen under the store lock, so two
    /// workers starting at the same time never both reset it.
    pub fn open_or_reset(path: impl Into<PathBuf>, parent_created: SystemTime) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StatusError::storage(&path, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StatusError::storage(&path, e))?;

        let mut locked = LockedFile::acquire(file, &path)?;
        let meta = locked.metadata()?;
        let modified = meta
            .modified()
            .map_err(|e| StatusError::storage(&path, e))?;

        if meta.len() == 0 || modified < parent_created {
            info!(path = %path.display(), "Resetting status file for new generation");
            locked.write_records(&[])?;
            if owned_by_current_user(&meta) {
                grant_group_write(&locked.file, &meta).map_err(|e| StatusError::storage(&path, e))?;
            }
        } else {
            debug!(path = %path.display(), "Reusing current status file");
        }
        drop(locked);

        Ok(Self { path })
    }

    /// Open an existing store without ever resetting it.
    ///
    /// Used by readers such as `workstat status`.
    pub fn existing(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::metadata(&path).map_err(|e| StatusError::storage(&path, e))?;
        Ok(Self { path })
    }

    /// Path of the status file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically read, transform and rewrite the record sequence.
    ///
    /// A corrupt or truncated document is treated as empty for this one
    /// transaction rather than failing the write. Returns the committed records.
    pub fn with_exclusive_access<F>(&self, mutate: F) -> Result<Vec<WorkerRecord>>
    where
        F: FnOnce(Vec<WorkerRecord>) -> Vec<WorkerRecord>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| StatusError::storage(&self.path, e))?;

        let mut locked = LockedFile::acquire(file, &self.path)?;
        let current = locked.read_records()?;
        let updated = mutate(current);
        locked.write_records(&updated)?;
        Ok(updated)
    }

    /// Read the full record sequence under the store lock.
    pub fn read_snapshot(&self) -> Result<Vec<WorkerRecord>> {
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|e| StatusError::storage(&self.path, e))?;

        let mut locked = LockedFile::acquire(file, &self.path)?;
        locked.read_records()
    }
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    workers: &'a [WorkerRecord],
}

/// An open status file holding the exclusive lock until dropped.
struct LockedFile<'a> {
    file: File,
    path: &'a Path,
}

impl<'a> LockedFile<'a> {
    fn acquire(file: File, path: &'a Path) -> Result<Self> {
        FileExt::lock_exclusive(&file).map_err(|e| StatusError::storage(path, e))?;
        Ok(Self { file, path })
    }

    fn metadata(&self) -> Result<Metadata> {
        self.file
            .metadata()
            .map_err(|e| StatusError::storage(self.path, e))
    }

    fn read_records(&mut self) -> Result<Vec<WorkerRecord>> {
        let mut buf = Vec::new();
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.read_to_end(&mut buf))
            .map_err(|e| StatusError::storage(self.path, e))?;
        Ok(parse_records(&buf, self.path))
    }

    fn write_records(&mut self, records: &[WorkerRecord]) -> Result<()> {
        let body = serde_json::to_vec(&DocumentRef { workers: records })?;
        self.rewrite(&body)
            .map_err(|e| StatusError::storage(self.path, e))
    }

    fn rewrite(&mut self, body: &[u8]) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(body)?;
        self.file.flush()
    }
}

impl Drop for LockedFile<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release status file lock");
        }
    }
}

/// Parse a status document, substituting an empty sequence when it is unreadable.
fn parse_records(buf: &[u8], path: &Path) -> Vec<WorkerRecord> {
    if buf.iter().all(u8::is_ascii_whitespace) {
        return Vec::new();
    }
    match serde_json::from_slice::<StoreDocument>(buf) {
        Ok(doc) => doc.workers,
        Err(e) => {
            let err = StatusError::TransientParse(e);
            warn!(path = %path.display(), error = %err, "Discarding unreadable status document");
            Vec::new()
        }
    }
}

fn owned_by_current_user(meta: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    meta.uid() == nix::unistd::getuid().as_raw()
}

fn grant_group_write(file: &File, meta: &Metadata) -> io::Result<()> {
    use std::os::unix::fs::{PermissionsExt, fchown};

    fchown(
        file,
        Some(nix::unistd::getuid().as_raw()),
        Some(nix::unistd::getgid().as_raw()),
    )?;
    let mut perms = meta.permissions();
    perms.set_mode(perms.mode() | GROUP_WRITE);
    file.set_permissions(perms)
}
