//! Persistence of the registry state with optimistic concurrency.
//!
//! Every commit names the generation it was computed from; a store whose
//! generation has moved on rejects the commit with `PromotionConflict` and
//! the caller recomputes from a fresh `load`.

use crate::error::{RegistryError, Result};
use crate::types::RegistryState;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub const REGISTRY_FILE: &str = "registry.json";

pub trait RegistryStore: Send + Sync {
    fn load(&self) -> Result<RegistryState>;

    /// Replace the stored state if it is still at `expected_generation`.
    ///
    /// Returns the new generation.
    fn commit(&self, expected_generation: u64, state: RegistryState) -> Result<u64>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<RegistryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for InMemoryStore {
    fn load(&self) -> Result<RegistryState> {
        let state = self.state.lock().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(state.clone())
    }

    fn commit(&self, expected_generation: u64, mut state: RegistryState) -> Result<u64> {
        let mut current = self.state.lock().map_err(|_| RegistryError::LockPoisoned)?;
        if current.generation != expected_generation {
            return Err(RegistryError::PromotionConflict {
                expected: expected_generation,
                found: current.generation,
            });
        }
        state.generation = expected_generation + 1;
        *current = state;
        Ok(current.generation)
    }
}

/// Registry kept as one JSON document, replaced atomically on commit.
///
/// The generation check is guarded by an in-process lock only; two processes
/// sharing the file are not serialised against each other.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Store at `<dir>/registry.json`, creating `dir` if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(REGISTRY_FILE),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<RegistryState> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RegistryState::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> Result<RegistryState> {
        self.read()
    }

    fn commit(&self, expected_generation: u64, mut state: RegistryState) -> Result<u64> {
        let _guard = self.write_lock.lock().map_err(|_| RegistryError::LockPoisoned)?;

        let found = self.read()?.generation;
        if found != expected_generation {
            return Err(RegistryError::PromotionConflict {
                expected: expected_generation,
                found,
            });
        }
        state.generation = expected_generation + 1;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &state)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| RegistryError::Io(e.error))?;

        debug!(generation = state.generation, "Registry committed");
        Ok(state.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_commit_rejected() {
        let store = InMemoryStore::new();
        let first = store.load().unwrap();
        let second = store.load().unwrap();

        assert_eq!(store.commit(first.generation, first).unwrap(), 1);
        assert!(matches!(
            store.commit(second.generation, second),
            Err(RegistryError::PromotionConflict { expected: 0, found: 1 })
        ));
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(store.load().unwrap(), RegistryState::default());

        let state = store.load().unwrap();
        store.commit(0, state).unwrap();

        let reopened = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load().unwrap().generation, 1);
        assert!(reopened.commit(0, RegistryState::default()).is_err());
    }
}
