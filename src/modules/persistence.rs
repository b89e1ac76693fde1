use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::error::AppResult;
use crate::models::QuotaUsage;

/// On-disk shape of the ledger: application id -> usage record
pub type LedgerFile = BTreeMap<String, QuotaUsage>;

/// Load the ledger file.
///
/// A missing or unparseable file yields an empty ledger; the failure is
/// logged and never surfaced.
pub fn load_ledger(path: &Path) -> LedgerFile {
    if !path.exists() {
        tracing::info!(path = %path.display(), "Quota ledger file not found, starting empty");
        return LedgerFile::new();
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to read quota ledger, starting empty: {}", e);
            return LedgerFile::new();
        }
    };

    match serde_json::from_str::<LedgerFile>(&content) {
        Ok(entries) => {
            tracing::info!(
                path = %path.display(),
                "Quota ledger loaded, contains {} applications",
                entries.len()
            );
            entries
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "Quota ledger is corrupt, starting empty: {}", e);
            LedgerFile::new()
        }
    }
}

/// Write the whole ledger (atomic write)
pub fn save_ledger(path: &Path, entries: &LedgerFile) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let content = serde_json::to_string_pretty(entries)?;
    let temp_path = path.with_extension("json.tmp");

    // Write to temp file
    fs::write(&temp_path, content)?;

    // Atomic rename
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn snapshot_entries(entries: &DashMap<String, QuotaUsage>) -> LedgerFile {
    entries
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect()
}

/// Write state shared between the writer and its timer tasks
struct WriteState {
    /// Serializes snapshot, write and rename so writers never share the temp file
    lock: Mutex<()>,
    /// Bumped by every schedule and flush; a timer only writes if it is still current
    generation: AtomicU64,
    /// Set on schedule, cleared only by a successful write
    dirty: AtomicBool,
}

impl WriteState {
    /// Snapshot and save under the write lock.
    ///
    /// With `generation` set, the write is skipped when a newer schedule or
    /// flush has superseded it.
    fn write(
        &self,
        path: &Path,
        entries: &DashMap<String, QuotaUsage>,
        generation: Option<u64>,
    ) -> AppResult<bool> {
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if generation.is_some_and(|g| g != self.generation.load(Ordering::SeqCst)) {
            return Ok(false);
        }

        // Cleared before the snapshot, so a mutation racing it marks the ledger dirty again
        self.dirty.store(false, Ordering::SeqCst);
        let snapshot = snapshot_entries(entries);
        if let Err(e) = save_ledger(path, &snapshot) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        tracing::debug!(
            path = %path.display(),
            "Quota ledger saved ({} applications)",
            snapshot.len()
        );
        Ok(true)
    }
}

/// Debounced writer for the ledger file.
///
/// Every [`schedule`](Self::schedule) cancels the pending timer and starts a
/// new one, so a burst of mutations produces a single write once the burst
/// has been quiet for the debounce interval. [`flush`](Self::flush) cancels
/// the timer and writes immediately.
pub struct DebouncedWriter {
    path: PathBuf,
    debounce: Duration,
    entries: Arc<DashMap<String, QuotaUsage>>,
    state: Arc<WriteState>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DebouncedWriter {
    pub fn new(
        path: PathBuf,
        debounce: Duration,
        entries: Arc<DashMap<String, QuotaUsage>>,
    ) -> Self {
        Self {
            path,
            debounce,
            entries,
            state: Arc::new(WriteState {
                lock: Mutex::new(()),
                generation: AtomicU64::new(0),
                dirty: AtomicBool::new(false),
            }),
            pending: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// (Re)start the debounce timer.
    ///
    /// Outside a Tokio runtime there is no timer to arm, so the ledger is
    /// written synchronously instead. Callers must not hold a map guard.
    pub fn schedule(&self) {
        self.state.dirty.store(true, Ordering::SeqCst);
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                if let Err(e) = self.state.write(&self.path, &self.entries, None) {
                    tracing::error!(path = %self.path.display(), "Failed to save quota ledger: {}", e);
                }
                return;
            }
        };

        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let path = self.path.clone();
        let entries = self.entries.clone();
        let state = self.state.clone();
        let debounce = self.debounce;
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(e) = state.write(&path, &entries, Some(generation)) {
                tracing::error!(path = %path.display(), "Failed to save quota ledger: {}", e);
            }
        }));
    }

    /// Whether mutations are waiting to be written
    pub fn has_pending(&self) -> bool {
        self.state.dirty.load(Ordering::SeqCst)
    }

    /// Cancel any pending timer and write the ledger now
    pub fn flush(&self) -> AppResult<()> {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        let pending = {
            let mut guard = match self.pending.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        };
        if let Some(handle) = pending {
            handle.abort();
        }
        self.state.write(&self.path, &self.entries, None).map(|_| ())
    }

    /// Flush only when mutations have not reached disk yet
    pub(crate) fn flush_if_pending(&self) {
        if self.has_pending() {
            if let Err(e) = self.flush() {
                tracing::error!(path = %self.path.display(), "Final quota ledger flush failed: {}", e);
            }
        }
    }
}
