//! Workflow snapshot persistence using JSON file storage
//!
//! One snapshot slot per scope. Writes go to a temporary file that is
//! renamed over the target, so a reader never observes a partial value.

use crate::error::PersistenceError;
use crate::models::workflow::WorkflowRunState;
use dashmap::DashMap;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Single-slot snapshot storage keyed by scope (usually a workspace)
pub trait StateStore: Send + Sync {
    /// Overwrite the snapshot for `scope`
    fn save(&self, scope: &str, state: &WorkflowRunState) -> Result<(), PersistenceError>;
    /// Load the snapshot for `scope`, if any
    fn load(&self, scope: &str) -> Result<Option<WorkflowRunState>, PersistenceError>;
    /// Remove the snapshot for `scope`; removing an empty slot is not an error
    fn clear(&self, scope: &str) -> Result<(), PersistenceError>;
}

/// JSON file written atomically and guarded by an advisory lock file
pub struct AtomicJsonFile<T> {
    path: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T> AtomicJsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn ensure_parent(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
            }
        }
        Ok(())
    }

    /// Take the exclusive lock; released when the returned file is dropped
    pub fn lock(&self) -> Result<File, PersistenceError> {
        self.ensure_parent()?;
        let lock_path = self.sibling(".lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| PersistenceError::io(&lock_path, e))?;
        file.lock_exclusive()
            .map_err(|e| PersistenceError::lock(&lock_path, e))?;
        Ok(file)
    }

    /// Read and parse the file; `None` when it is missing or empty
    pub fn load(&self) -> Result<Option<T>, PersistenceError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceError::io(&self.path, e)),
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Write to a temp file, fsync it, then rename it over the target
    pub fn save(&self, value: &T) -> Result<(), PersistenceError> {
        self.ensure_parent()?;
        let json = serde_json::to_string_pretty(value)?;
        let tmp_path = self.sibling(".tmp");

        {
            let mut file = File::create(&tmp_path).map_err(|e| PersistenceError::io(&tmp_path, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| PersistenceError::io(&tmp_path, e))?;
            file.sync_all()
                .map_err(|e| PersistenceError::io(&tmp_path, e))?;
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| PersistenceError::io(&self.path, e))
    }

    /// Delete the file; a missing file is fine
    pub fn remove(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::io(&self.path, e)),
        }
    }
}

/// Root JSON document holding one snapshot per scope
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SnapshotFile {
    #[serde(default)]
    pub scopes: HashMap<String, WorkflowRunState>,
}

/// File-backed state store
pub struct JsonStateStore {
    file: AtomicJsonFile<SnapshotFile>,
}

impl JsonStateStore {
    /// Create a store backed by `store_path`; the parent directory is created
    pub fn new<P: AsRef<Path>>(store_path: P) -> Result<Self, PersistenceError> {
        let store_path = store_path.as_ref();
        if let Some(parent) = store_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
            }
        }

        Ok(Self {
            file: AtomicJsonFile::new(store_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn update<F>(&self, apply: F) -> Result<(), PersistenceError>
    where
        F: FnOnce(&mut SnapshotFile),
    {
        let _lock = self.file.lock()?;
        let mut root = self.file.load()?.unwrap_or_default();
        apply(&mut root);
        if root.scopes.is_empty() {
            self.file.remove()
        } else {
            self.file.save(&root)
        }
    }
}

impl StateStore for JsonStateStore {
    fn save(&self, scope: &str, state: &WorkflowRunState) -> Result<(), PersistenceError> {
        self.update(|root| {
            root.scopes.insert(scope.to_string(), state.clone());
        })?;
        tracing::debug!(
            scope = scope,
            step = state.current_step,
            total = state.total_steps,
            "Saved workflow snapshot"
        );
        Ok(())
    }

    fn load(&self, scope: &str) -> Result<Option<WorkflowRunState>, PersistenceError> {
        let _lock = self.file.lock()?;
        Ok(self
            .file
            .load()?
            .and_then(|mut root| root.scopes.remove(scope)))
    }

    fn clear(&self, scope: &str) -> Result<(), PersistenceError> {
        self.update(|root| {
            root.scopes.remove(scope);
        })?;
        tracing::debug!(scope = scope, "Cleared workflow snapshot");
        Ok(())
    }
}

/// In-process state store, for embedding and tests
#[derive(Default)]
pub struct MemoryStateStore {
    slots: DashMap<String, WorkflowRunState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, scope: &str, state: &WorkflowRunState) -> Result<(), PersistenceError> {
        self.slots.insert(scope.to_string(), state.clone());
        Ok(())
    }

    fn load(&self, scope: &str) -> Result<Option<WorkflowRunState>, PersistenceError> {
        Ok(self.slots.get(scope).map(|entry| entry.clone()))
    }

    fn clear(&self, scope: &str) -> Result<(), PersistenceError> {
        self.slots.remove(scope);
        Ok(())
    }
}
