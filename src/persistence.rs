//! Best-effort JSON persistence for ledgers and baseline snapshots
//!
//! Reads fall back to `None` on a missing or unparseable document. Writes are
//! atomic (temp file + rename) and never fail the caller: errors are logged
//! and counted, and the next successful write carries the full state.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ ENGINE (caller thread)                        │
//! │   ledger.to_json() → writer.submit(path, ..)  │
//! └──────────────────────────────────────────────┘
//!                     │ crossbeam channel
//!                     ▼
//! ┌──────────────────────────────────────────────┐
//! │ SIDECAR THREAD                                │
//! │   drain queue, keep newest job per path       │
//! │   write_atomic(path, bytes)                   │
//! └──────────────────────────────────────────────┘
//! ```

use crate::config::WriteMode;
use crossbeam::channel::{self, Receiver, Sender};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Errors from reading or writing persisted documents
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Persistence writer is shut down")]
    WriterClosed,
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Read and parse a JSON document
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a JSON document, treating any failure as "no document"
///
/// A missing file is expected on first start and logged at debug level;
/// anything else is logged as a warning.
pub fn load_or_default<T: DeserializeOwned>(path: &Path) -> Option<T> {
    match read_json(path) {
        Ok(value) => Some(value),
        Err(PersistenceError::Io { ref source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            tracing::debug!(path = %path.display(), "no persisted document, using defaults");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to load persisted document, using defaults");
            None
        }
    }
}

/// Write bytes atomically: temp file in the same directory, then rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    {
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp, path).map_err(io_err)
}

enum Job {
    Write { path: PathBuf, bytes: Vec<u8> },
    Flush(Sender<()>),
    Shutdown,
}

/// Counters for persistence activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub writes_submitted: u64,
    pub writes_completed: u64,
    pub writes_coalesced: u64,
    pub writes_failed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    coalesced: AtomicU64,
    failed: AtomicU64,
}

/// Writes whole JSON documents, deferred to a sidecar thread or inline
pub struct PersistenceWriter {
    mode: WriteMode,
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl PersistenceWriter {
    /// Create a writer; `Deferred` spawns the sidecar thread
    pub fn new(mode: WriteMode) -> Self {
        let counters = Arc::new(Counters::default());
        let (sender, handle) = match mode {
            WriteMode::Deferred => {
                let (tx, rx) = channel::unbounded();
                let worker_counters = counters.clone();
                let handle = thread::Builder::new()
                    .name("perfguard-persist".to_string())
                    .spawn(move || Self::sidecar_worker(rx, worker_counters));
                match handle {
                    Ok(handle) => (Some(tx), Some(handle)),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to spawn persistence thread, writing inline");
                        (None, None)
                    }
                }
            }
            WriteMode::Immediate => (None, None),
        };

        Self {
            mode: if sender.is_some() {
                mode
            } else {
                WriteMode::Immediate
            },
            sender,
            handle,
            counters,
        }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Queue (or perform) a whole-document write
    ///
    /// Failures are logged and counted; they are never returned.
    pub fn submit(&self, path: PathBuf, bytes: Vec<u8>) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        match &self.sender {
            Some(sender) => {
                if let Err(e) = sender.send(Job::Write { path, bytes }) {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(error = %e, "persistence writer closed, write dropped");
                }
            }
            None => Self::perform(&path, &bytes, &self.counters),
        }
    }

    /// Block until every write submitted so far has been attempted
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack_tx, ack_rx) = channel::bounded(1);
        if sender.send(Job::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            writes_submitted: self.counters.submitted.load(Ordering::Relaxed),
            writes_completed: self.counters.completed.load(Ordering::Relaxed),
            writes_coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            writes_failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    fn perform(path: &Path, bytes: &[u8], counters: &Counters) {
        match write_atomic(path, bytes) {
            Ok(()) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %path.display(), bytes = bytes.len(), "persisted document");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "persistence write failed");
            }
        }
    }

    /// Sidecar loop: block for one job, drain whatever else is queued,
    /// write the newest payload per path, then acknowledge flushes
    fn sidecar_worker(rx: Receiver<Job>, counters: Arc<Counters>) {
        loop {
            let Ok(first) = rx.recv() else {
                return;
            };

            let mut pending: HashMap<PathBuf, Vec<u8>> = HashMap::new();
            let mut order: Vec<PathBuf> = Vec::new();
            let mut acks: Vec<Sender<()>> = Vec::new();
            let mut shutdown = false;

            for job in std::iter::once(first).chain(rx.try_iter()) {
                match job {
                    Job::Write { path, bytes } => {
                        if pending.insert(path.clone(), bytes).is_some() {
                            counters.coalesced.fetch_add(1, Ordering::Relaxed);
                        } else {
                            order.push(path);
                        }
                    }
                    Job::Flush(ack) => acks.push(ack),
                    Job::Shutdown => shutdown = true,
                }
            }

            for path in order {
                if let Some(bytes) = pending.remove(&path) {
                    Self::perform(&path, &bytes, &counters);
                }
            }
            for ack in acks {
                let _ = ack.send(());
            }
            if shutdown {
                return;
            }
        }
    }
}

impl Drop for PersistenceWriter {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Job::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
