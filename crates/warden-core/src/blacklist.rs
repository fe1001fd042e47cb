//! Blacklist file storage.
//!
//! A single JSON document, `{"blacklist": ["modid", ...]}`. Entries
//! are normalized to lowercase on the way in; matching elsewhere is
//! case-insensitive, so storage holds the canonical form.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("blacklist io: {0}")]
    Io(#[from] io::Error),
    #[error("blacklist is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BlacklistDoc {
    #[serde(default)]
    blacklist: Vec<String>,
}

/// Blacklist backed by a JSON file. Mutations persist immediately.
#[derive(Debug)]
pub struct BlacklistFile {
    path: PathBuf,
    mods: BTreeSet<String>,
}

impl BlacklistFile {
    /// Load from `path`, creating an empty file if none exists.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, BlacklistError> {
        let path = path.into();
        let mods = match fs::read_to_string(&path) {
            Ok(text) => {
                let doc: BlacklistDoc = serde_json::from_str(&text)?;
                doc.blacklist
                    .into_iter()
                    .map(|m| m.to_lowercase())
                    .collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(e.into()),
        };
        let file = Self { path, mods };
        if !file.path.exists() {
            file.save()?;
        }
        info!(path = %file.path.display(), entries = file.mods.len(), "blacklist loaded");
        Ok(file)
    }

    pub fn save(&self) -> Result<(), BlacklistError> {
        let doc = BlacklistDoc {
            blacklist: self.mods.iter().cloned().collect(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&doc)?)?;
        Ok(())
    }

    /// Add a module id. Returns false if it was already present.
    pub fn add(&mut self, id: &str) -> Result<bool, BlacklistError> {
        if !self.mods.insert(id.to_lowercase()) {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Remove a module id. Returns false if it was not present.
    pub fn remove(&mut self, id: &str) -> Result<bool, BlacklistError> {
        if !self.mods.remove(&id.to_lowercase()) {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.mods.contains(&id.to_lowercase())
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.mods.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_starts_empty_and_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.json");
        let file = BlacklistFile::load(&path).unwrap();
        assert!(file.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn add_remove_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.json");
        let mut file = BlacklistFile::load(&path).unwrap();
        assert!(file.add("EvilMod").unwrap());
        assert!(!file.add("evilmod").unwrap());

        let reloaded = BlacklistFile::load(&path).unwrap();
        assert!(reloaded.contains("EVILMOD"));
        assert_eq!(reloaded.len(), 1);

        assert!(file.remove("evilMod").unwrap());
        assert!(!file.remove("evilmod").unwrap());
        let reloaded = BlacklistFile::load(&path).unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            BlacklistFile::load(&path),
            Err(BlacklistError::Parse(_))
        ));
    }

    #[test]
    fn missing_field_defaults_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.json");
        fs::write(&path, "{}").unwrap();
        assert!(BlacklistFile::load(&path).unwrap().is_empty());
    }
}
