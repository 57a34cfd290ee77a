//! Durable JSON state for tickets, staff counters and quota periods.
//!
//! The on-disk document is the only durable copy; [`StoreData`] is the single
//! mutable in-memory mirror. Every successful mutation is written back before
//! it returns, using a sibling temp file and a rename so a crash mid-write
//! leaves either the old or the new document, never a torn one.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::{ErrorCode, TallyError};
use crate::model::{
    CategoryTag, CreditRequest, Lifecycle, Note, PriorityTag, QuotaHistoryEntry, QuotaSlot,
    StaffId, StaffStats, TicketId,
};
use crate::snapshot::Snapshot;

/// Failure reading or writing a state document.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt state file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl PersistenceError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::StoreReadFailed,
            Self::Corrupt { .. } => ErrorCode::CorruptStore,
            Self::Write { .. } => ErrorCode::StoreWriteFailed,
            Self::Serialize(_) => ErrorCode::InternalUnexpected,
        }
    }
}

/// Everything persisted in the main state document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreData {
    pub contributions: BTreeMap<TicketId, BTreeSet<StaffId>>,
    pub staff_stats: BTreeMap<StaffId, StaffStats>,
    pub quotas: QuotaSlot,
    pub quota_history: BTreeMap<String, QuotaHistoryEntry>,
    pub priorities: BTreeMap<TicketId, PriorityTag>,
    pub categories: BTreeMap<TicketId, CategoryTag>,
    pub notes: BTreeMap<TicketId, Vec<Note>>,
    pub tickets: BTreeMap<TicketId, Lifecycle>,
    pub credit_requests: Vec<CreditRequest>,
}

impl StoreData {
    /// Lifecycle of a ticket, if the store has ever seen it.
    #[must_use]
    pub fn lifecycle(&self, ticket: &TicketId) -> Option<&Lifecycle> {
        self.tickets.get(ticket)
    }

    #[must_use]
    pub fn is_closed(&self, ticket: &TicketId) -> bool {
        self.tickets.get(ticket).is_some_and(Lifecycle::is_closed)
    }

    /// Stats for `staff`, created on first use.
    pub fn stats_mut(&mut self, staff: &StaffId) -> &mut StaffStats {
        self.staff_stats.entry(staff.clone()).or_default()
    }
}

/// The main state document and its location.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    data: StoreData,
}

/// Store handle shared by every component.
pub type SharedStore = Arc<Mutex<Store>>;

impl Store {
    /// Load the document at `path`.
    ///
    /// A missing file is a first run: empty state is written out and returned.
    /// A file that exists but does not parse is fatal and left untouched.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        match read_json::<StoreData>(&path)? {
            Some(data) => {
                debug!(path = %path.display(), tickets = data.tickets.len(), "loaded state");
                Ok(Self { path, data })
            }
            None => {
                let store = Self {
                    path,
                    data: StoreData::default(),
                };
                store.save()?;
                info!(path = %store.path.display(), "initialized empty state file");
                Ok(store)
            }
        }
    }

    /// Write the whole document atomically.
    pub fn save(&self) -> Result<(), PersistenceError> {
        write_json_atomic(&self.path, &self.data)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn data(&self) -> &StoreData {
        &self.data
    }

    /// Apply `apply` and persist the result.
    ///
    /// If `apply` fails, or the write does, the in-memory state is restored
    /// to what it was before the call.
    pub fn mutate<T>(
        &mut self,
        apply: impl FnOnce(&mut StoreData) -> Result<T, TallyError>,
    ) -> Result<T, TallyError> {
        let before = self.data.clone();
        let value = match apply(&mut self.data) {
            Ok(value) => value,
            Err(err) => {
                self.data = before;
                return Err(err);
            }
        };
        if let Err(err) = self.save() {
            self.data = before;
            return Err(err.into());
        }
        Ok(value)
    }

    /// Read-only projection for the status endpoint.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_data(&self.data)
    }

    #[must_use]
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }
}

/// Lock a shared handle, recovering from a poisoned mutex.
///
/// Mutations restore their pre-image on failure, so the data behind a
/// poisoned lock is still the last consistent state.
pub fn lock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read and parse a JSON document; `Ok(None)` if it does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialize `value` as pretty JSON next to `path`, then rename over it.
pub(crate) fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let body = serde_json::to_vec_pretty(value).map_err(PersistenceError::Serialize)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, body).map_err(|source| PersistenceError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(write_err)
}
