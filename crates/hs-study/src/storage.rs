//! Study persistence.
//!
//! The local backend keeps one JSON document per study under a storage root.
//! Writes replace the whole document; coordination between workers is the
//! backend's concern, and the local backend is last-writer-wins, so
//! multi-worker runs should point workers at per-worker ledgers (they do)
//! and treat the study document as advisory shared state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hs_types::{Direction, HsResult, StudyError};

use crate::trial::Trial;

/// The persisted portion of a study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySnapshot {
    pub id: Uuid,
    pub name: String,
    pub directions: Vec<Direction>,
    pub metrics: Vec<String>,
    pub trials: Vec<Trial>,
}

/// Local JSON-file study storage.
#[derive(Debug, Clone)]
pub struct StudyStorage {
    root: PathBuf,
}

impl StudyStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> HsResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn study_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.study_path(name).is_file()
    }

    pub fn save(&self, snapshot: &StudySnapshot) -> HsResult<()> {
        let path = self.study_path(&snapshot.name);
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json).map_err(|e| StudyError::StorageFailed {
            message: format!("writing {}: {e}", path.display()),
        })?;
        Ok(())
    }

    pub fn load(&self, name: &str) -> HsResult<StudySnapshot> {
        let path = self.study_path(name);
        if !path.is_file() {
            return Err(StudyError::NotFound {
                study: name.to_string(),
            }
            .into());
        }
        let json = fs::read_to_string(&path)?;
        let snapshot = serde_json::from_str(&json).map_err(|e| StudyError::StorageFailed {
            message: format!("parsing {}: {e}", path.display()),
        })?;
        Ok(snapshot)
    }
}
