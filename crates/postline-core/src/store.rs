use crate::catalog::RotationCatalog;
use crate::error::{PostlineError, Result};
use crate::paths;
use crate::state::RotationState;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Durable home of the single [`RotationState`] record.
///
/// Implementations write the whole record on every save; there are no
/// partial updates.
pub trait StateStore: Send + Sync {
    /// Returns `Ok(None)` when nothing has been persisted yet. Unreadable or
    /// unparsable storage is an error, never a silent default.
    fn load(&self) -> Result<Option<RotationState>>;

    fn save(&self, state: &RotationState) -> Result<()>;
}

/// Load the record, creating defaults lazily, and check it against `catalog`.
pub fn read_state(store: &dyn StateStore, catalog: &RotationCatalog) -> Result<RotationState> {
    let state = store.load()?.unwrap_or_default();
    state.validate(catalog)?;
    Ok(state)
}

// ---------------------------------------------------------------------------
// YamlStateStore
// ---------------------------------------------------------------------------

/// Keeps the record in `.postline/rotation.yaml`, written atomically.
#[derive(Debug, Clone)]
pub struct YamlStateStore {
    path: PathBuf,
}

impl YamlStateStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: paths::rotation_path(root),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for YamlStateStore {
    fn load(&self) -> Result<Option<RotationState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        let state: RotationState = serde_yaml::from_str(&data).map_err(|e| {
            PostlineError::StateCorrupt(format!("{}: {e}", self.path.display()))
        })?;
        Ok(Some(state))
    }

    fn save(&self, state: &RotationState) -> Result<()> {
        let data = serde_yaml::to_string(state)?;
        crate::io::atomic_write(&self.path, data.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// MemoryStateStore
// ---------------------------------------------------------------------------

/// In-memory store. Clones share the same record, so a test can keep one
/// handle for inspection while another is owned by the engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<Option<RotationState>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: RotationState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(state))),
        }
    }

    pub fn snapshot(&self) -> Option<RotationState> {
        self.inner.lock().ok().and_then(|g| g.clone())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<RotationState>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| PostlineError::StateCorrupt("memory store poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, state: &RotationState) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| PostlineError::StateCorrupt("memory store poisoned".to_string()))?;
        *guard = Some(state.clone());
        Ok(())
    }
}
