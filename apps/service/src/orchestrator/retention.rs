//! Saving and loading the engine's retention snapshot.
//!
//! The snapshot is written next to its final location and renamed into
//! place, so a crash mid-write leaves the previous file intact.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};
use vigil::RetentionSnapshot;

/// Retention file on disk
#[derive(Debug, Clone)]
pub struct RetentionStore {
    path: PathBuf,
}

impl RetentionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the last saved snapshot, `None` on first start
    pub fn load(&self) -> Result<Option<RetentionSnapshot>> {
        if !self.path.exists() {
            debug!("No retention file at {}", self.path.display());
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading retention file {}", self.path.display()))?;
        let snapshot = RetentionSnapshot::from_json(&text)
            .with_context(|| format!("parsing retention file {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    pub fn save(&self, snapshot: &RetentionSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = snapshot.to_json()?;
        let temporary = self.path.with_extension("json.tmp");
        fs::write(&temporary, json).with_context(|| format!("writing {}", temporary.display()))?;
        fs::rename(&temporary, &self.path)
            .with_context(|| format!("moving retention data into {}", self.path.display()))?;
        info!(
            "Saved retention data for {} entities to {}",
            snapshot.entities.len(),
            self.path.display()
        );
        Ok(())
    }
}
