use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::item::{Item, migrate};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to back up {} to {}: {source}", .path.display(), .backup.display())]
    Backup {
        path: PathBuf,
        backup: PathBuf,
        source: io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to encode {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Result of [`Store::load`]. A `warning` means the file exists but could
/// not be used; it has been left untouched on disk.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub items: Vec<Item>,
    pub warning: Option<String>,
}

/// The inverse of the last delete: put `item` back at `index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoSlot {
    pub index: usize,
    pub item: Item,
}

#[derive(Debug, Clone)]
pub struct Store {
    pub path: PathBuf,
    pub backup_path: PathBuf,
    pub undo_path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backup_path = with_suffix(&path, ".bak");
        let undo_path = with_suffix(&path, ".undo");
        Self {
            path,
            backup_path,
            undo_path,
        }
    }

    #[tracing::instrument(skip(self, now), fields(file = %self.path.display()))]
    pub fn load(&self, now: NaiveDateTime) -> Loaded {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("data file missing; starting empty");
                return Loaded::default();
            }
            Err(err) => {
                return self.recovered(format!("failed to read {}: {err}", self.path.display()));
            }
        };

        let decoded: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                return self.recovered(format!("failed parsing {}: {err}", self.path.display()));
            }
        };

        let Value::Array(entries) = decoded else {
            return self.recovered(format!(
                "{} does not hold a JSON array; ignoring its contents",
                self.path.display()
            ));
        };

        let items: Vec<Item> = entries.iter().map(|raw| migrate(raw, now)).collect();
        info!(count = items.len(), "loaded items");
        Loaded {
            items,
            warning: None,
        }
    }

    /// Backs up the current file, then replaces it with `items`.
    ///
    /// A failed backup aborts before anything is written.
    #[tracing::instrument(skip(self, items), fields(file = %self.path.display(), count = items.len()))]
    pub fn save(&self, items: &[Item]) -> Result<(), StoreError> {
        if self.path.exists() {
            fs::copy(&self.path, &self.backup_path).map_err(|source| StoreError::Backup {
                path: self.path.clone(),
                backup: self.backup_path.clone(),
                source,
            })?;
            debug!(backup = %self.backup_path.display(), "backed up data file");
        }

        let payload = serde_json::to_vec_pretty(items).map_err(|source| StoreError::Encode {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &payload).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!("saved items");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(file = %self.undo_path.display()))]
    pub fn load_undo(&self) -> Option<UndoSlot> {
        let raw = match fs::read_to_string(&self.undo_path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(error = %err, "failed reading undo slot; ignoring it");
                }
                return None;
            }
        };

        match serde_json::from_str::<UndoSlot>(&raw) {
            Ok(slot) => Some(slot),
            Err(err) => {
                warn!(error = %err, "failed parsing undo slot; ignoring it");
                None
            }
        }
    }

    #[tracing::instrument(skip(self, slot), fields(file = %self.undo_path.display()))]
    pub fn save_undo(&self, slot: Option<&UndoSlot>) -> Result<(), StoreError> {
        let Some(slot) = slot else {
            return match fs::remove_file(&self.undo_path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(StoreError::Write {
                    path: self.undo_path.clone(),
                    source,
                }),
            };
        };

        let payload = serde_json::to_vec(slot).map_err(|source| StoreError::Encode {
            path: self.undo_path.clone(),
            source,
        })?;
        write_atomic(&self.undo_path, &payload).map_err(|source| StoreError::Write {
            path: self.undo_path.clone(),
            source,
        })
    }

    fn recovered(&self, warning: String) -> Loaded {
        warn!(warning = %warning, "starting with an empty list");
        Loaded {
            items: vec![],
            warning: Some(warning),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn write_atomic(path: &Path, payload: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(payload)?;
    temp.flush()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
