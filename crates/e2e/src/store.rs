//! File-backed shared fixture store
//!
//! Holds identifiers exported by upstream scenarios for the rest of one suite
//! run. Reads are best-effort: a missing or unreadable file is an empty store.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::context::FixtureBundle;
use crate::error::E2eResult;

#[derive(Debug, Clone)]
pub struct SharedFixtureStore {
    path: PathBuf,
}

impl SharedFixtureStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents; empty if the file is absent or corrupt.
    pub fn load(&self) -> FixtureBundle {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return FixtureBundle::new(),
            Err(e) => {
                warn!("Cannot read fixture store {}: {}", self.path.display(), e);
                return FixtureBundle::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("Ignoring corrupt fixture store {}: {}", self.path.display(), e);
                FixtureBundle::new()
            }
        }
    }

    pub fn save(&self, key: &str, value: &str) -> E2eResult<()> {
        let mut bundle = self.load();
        bundle.insert(key, value);
        self.write(&bundle)
    }

    /// Merge every key of `bundle` into the store.
    pub fn save_all(&self, bundle: &FixtureBundle) -> E2eResult<()> {
        let mut current = self.load();
        for (key, value) in bundle.iter() {
            current.insert(key, value);
        }
        self.write(&current)
    }

    /// Empty the store at the start of a run.
    pub fn clear(&self) -> E2eResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Cleared fixture store {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, bundle: &FixtureBundle) -> E2eResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(bundle)?)?;
        Ok(())
    }
}
