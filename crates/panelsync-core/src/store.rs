use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::record::{backfill_defaults, ServerRecord};

const META_SUFFIX: &str = ".meta";
const LOCK_SUFFIX: &str = ".lock";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("target {host}:{port} is already monitored as #{existing}")]
    DuplicateTarget { host: String, port: u16, existing: u64 },
    #[error("target #{0} not found")]
    TargetNotFound(u64),
    #[error("failed to persist store: {0}")]
    Persistence(String),
    #[error("failed to load store from {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("store {path} is in use by another panelsyncd process")]
    Locked { path: String },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreMeta {
    highest_issued: u64,
}

/// Owns every monitored record and rewrites the backing JSON file after each mutation.
///
/// A file-backed store holds an exclusive lock on `<path>.lock` for its whole lifetime, so
/// only one process at a time can change the file. The highest id ever issued is kept in
/// `<path>.meta` so removed ids stay retired across restarts.
pub struct RecordStore {
    path: Option<PathBuf>,
    records: BTreeMap<u64, ServerRecord>,
    highest_issued: u64,
    _lock: Option<File>,
}

impl RecordStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: BTreeMap::new(),
            highest_issued: 0,
            _lock: None,
        }
    }

    /// Locks and loads the store file, backfilling fields introduced after it was written.
    /// A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let lock = acquire_lock(&path)?;
        let (records, highest_issued) = read_store(&path)?;
        Ok(Self {
            path: Some(path),
            records,
            highest_issued,
            _lock: Some(lock),
        })
    }

    /// Reads the store file without locking it. The copy is detached from the file:
    /// mutations stay in memory.
    pub fn snapshot(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let (records, highest_issued) = read_store(path.as_ref())?;
        Ok(Self {
            path: None,
            records,
            highest_issued,
            _lock: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn add(
        &mut self,
        host: &str,
        port: u16,
        name: &str,
        display_port: Option<u16>,
    ) -> Result<u64, StoreError> {
        if let Some(existing) = self.find_by_addr(host, port) {
            return Err(StoreError::DuplicateTarget {
                host: host.to_string(),
                port,
                existing,
            });
        }

        let max_present = self.records.keys().next_back().copied().unwrap_or(0);
        let id = max_present.max(self.highest_issued) + 1;
        self.highest_issued = id;
        self.records
            .insert(id, ServerRecord::new(id, host, port, name, display_port));
        info!(target_id = id, host, port, name = %name, "added target");
        self.persist();
        Ok(id)
    }

    pub fn get(&self, id: u64) -> Result<&ServerRecord, StoreError> {
        self.records.get(&id).ok_or(StoreError::TargetNotFound(id))
    }

    /// Applies `mutate` to the record and persists the whole store.
    pub fn update<R>(
        &mut self,
        id: u64,
        mutate: impl FnOnce(&mut ServerRecord) -> R,
    ) -> Result<R, StoreError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(StoreError::TargetNotFound(id))?;
        let out = mutate(record);
        self.persist();
        Ok(out)
    }

    pub fn remove(&mut self, id: u64) -> Result<ServerRecord, StoreError> {
        let record = self
            .records
            .remove(&id)
            .ok_or(StoreError::TargetNotFound(id))?;
        info!(target_id = id, name = %record.name, "removed target");
        self.persist();
        Ok(record)
    }

    pub fn list(&self) -> impl Iterator<Item = &ServerRecord> {
        self.records.values()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.records.keys().copied().collect()
    }

    pub fn find_by_addr(&self, host: &str, port: u16) -> Option<u64> {
        self.records
            .values()
            .find(|r| r.ip == host && r.port == port)
            .map(|r| r.id)
    }

    /// Writes the full store; failures are logged and the in-memory state stays authoritative.
    pub fn persist(&self) {
        if let Err(err) = self.save() {
            error!(error = %err, "store not saved, in-memory state kept");
        }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        let doc = self
            .records
            .iter()
            .map(|(id, record)| serde_json::to_value(record).map(|value| (id.to_string(), value)))
            .collect::<Result<Map<String, Value>, _>>()
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        let body = serde_json::to_vec_pretty(&Value::Object(doc))
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        let meta = serde_json::to_vec(&StoreMeta {
            highest_issued: self.highest_issued,
        })
        .map_err(|e| StoreError::Persistence(e.to_string()))?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| StoreError::Persistence(e.to_string()))?;
        }
        write_replace(path, &body)?;
        write_replace(&sidecar(path, META_SUFFIX), &meta)?;

        debug!(path = %path.display(), count = self.records.len(), "store saved");
        Ok(())
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_replace(path: &Path, body: &[u8]) -> Result<(), StoreError> {
    let tmp = sidecar(path, ".tmp");
    fs::write(&tmp, body).map_err(|e| StoreError::Persistence(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::Persistence(e.to_string()))
}

fn acquire_lock(path: &Path) -> Result<File, StoreError> {
    let lock_path = sidecar(path, LOCK_SUFFIX);
    let lock_err = |reason: String| StoreError::Load {
        path: lock_path.display().to_string(),
        reason,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| lock_err(e.to_string()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| lock_err(e.to_string()))?;

    match file.try_lock() {
        Ok(()) => Ok(file),
        Err(TryLockError::WouldBlock) => Err(StoreError::Locked {
            path: path.display().to_string(),
        }),
        Err(TryLockError::Error(e)) => Err(lock_err(e.to_string())),
    }
}

fn read_store(path: &Path) -> Result<(BTreeMap<u64, ServerRecord>, u64), StoreError> {
    let load_err = |reason: String| StoreError::Load {
        path: path.display().to_string(),
        reason,
    };

    let retired = read_meta(path).map_err(load_err)?;
    if !path.exists() {
        info!(path = %path.display(), "store file not found, starting empty");
        return Ok((BTreeMap::new(), retired));
    }

    let raw = fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
    let records = parse_records(&raw).map_err(load_err)?;
    let highest_issued = records
        .keys()
        .next_back()
        .copied()
        .unwrap_or(0)
        .max(retired);
    info!(path = %path.display(), count = records.len(), highest_issued, "loaded store");
    Ok((records, highest_issued))
}

/// Highest id issued so far; 0 when no metadata was written yet.
fn read_meta(path: &Path) -> Result<u64, String> {
    let meta_path = sidecar(path, META_SUFFIX);
    let raw = match fs::read_to_string(&meta_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(format!("{}: {e}", meta_path.display())),
    };
    serde_json::from_str::<StoreMeta>(&raw)
        .map(|meta| meta.highest_issued)
        .map_err(|e| format!("{}: {e}", meta_path.display()))
}

fn parse_records(raw: &str) -> Result<BTreeMap<u64, ServerRecord>, String> {
    let doc: Map<String, Value> = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let mut records = BTreeMap::new();

    for (key, value) in doc {
        let id: u64 = key
            .parse()
            .map_err(|_| format!("record key {key:?} is not a numeric id"))?;
        let Value::Object(mut fields) = value else {
            return Err(format!("record #{id} is not an object"));
        };

        for field in backfill_defaults(&mut fields) {
            info!(target_id = id, field, "backfilled missing field");
        }

        let mut record: ServerRecord = serde_json::from_value(Value::Object(fields))
            .map_err(|e| format!("record #{id}: {e}"))?;
        record.id = id;
        records.insert(id, record);
    }

    Ok(records)
}
