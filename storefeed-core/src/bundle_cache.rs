//! Identifier cache (`bundleId.csv`)
//!
//! Maps human-readable app names to bundle identifiers so the package
//! inspection in [`crate::resolver`] only runs once per app. The table is
//! append-only: `insert` never checks for an existing name, callers are
//! expected to `lookup` first.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One row of the cache file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierCacheRow {
    pub name: String,
    #[serde(rename = "bundleId")]
    pub bundle_id: String,
}

/// Name → bundle identifier table backed by a CSV file
#[derive(Debug, Clone)]
pub struct IdentifierCache {
    rows: Vec<IdentifierCacheRow>,
    path: PathBuf,
}

impl IdentifierCache {
    /// Load the cache, or start empty when the file does not exist
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            tracing::debug!("No identifier cache at {}, starting empty", path.display());
            return Ok(Self {
                rows: Vec::new(),
                path,
            });
        }

        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("Failed to open identifier cache: {}", path.display()))?;

        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<IdentifierCacheRow>, _>>()
            .with_context(|| format!("Failed to parse identifier cache: {}", path.display()))?;

        tracing::debug!("Loaded {} cached identifiers", rows.len());
        Ok(Self { rows, path })
    }

    /// First cached identifier for `name`
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.name == name)
            .map(|row| row.bundle_id.as_str())
    }

    /// Append a row without uniqueness checks
    pub fn insert(&mut self, name: &str, bundle_id: &str) {
        self.rows.push(IdentifierCacheRow {
            name: name.to_string(),
            bundle_id: bundle_id.to_string(),
        });
    }

    /// Overwrite the backing file with the full table
    pub fn persist(&self) -> Result<()> {
        self.persist_to(&self.path)
    }

    /// Write the full table to a specific path
    pub fn persist_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // Header is written explicitly so an empty cache still produces a valid file.
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("Failed to create identifier cache: {}", path.display()))?;

        writer.write_record(["name", "bundleId"])?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write identifier cache: {}", path.display()))?;

        Ok(())
    }

    pub fn rows(&self) -> &[IdentifierCacheRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let cache = IdentifierCache::load(temp_dir.path().join("bundleId.csv")).unwrap();
        assert!(cache.is_empty());
        assert!(cache.lookup("Foo").is_none());
    }

    #[test]
    fn test_insert_persist_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundleId.csv");

        let mut cache = IdentifierCache::load(&path).unwrap();
        cache.insert("Foo", "com.foo.bar");
        cache.persist().unwrap();

        let reloaded = IdentifierCache::load(&path).unwrap();
        assert_eq!(reloaded.lookup("Foo"), Some("com.foo.bar"));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundleId.csv");

        let mut cache = IdentifierCache::load(&path).unwrap();
        cache.insert("My App", "com.example.myapp");
        cache.insert("Other", "org.other");
        cache.persist().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "name,bundleId\nMy App,com.example.myapp\nOther,org.other\n"
        );
    }

    #[test]
    fn test_empty_cache_writes_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundleId.csv");

        IdentifierCache::load(&path).unwrap().persist().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "name,bundleId\n");
        assert!(IdentifierCache::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_duplicates_first_wins() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundleId.csv");
        std::fs::write(&path, "name,bundleId\nFoo,com.first\nFoo,com.second\n").unwrap();

        let cache = IdentifierCache::load(&path).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup("Foo"), Some("com.first"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundleId.csv");
        std::fs::write(&path, "name,bundleId\nFoo,com.foo,extra\n").unwrap();

        let err = IdentifierCache::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse identifier cache"));
    }
}
