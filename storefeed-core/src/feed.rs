//! Feed records and the flat → grouped transform
//!
//! The flat feed has one [`AssetRecord`] per package asset. The grouped feed
//! has one [`AppRecord`] per app name, each carrying its [`VersionEntry`]
//! history newest-first.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// One harvested package asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub name: String,
    pub bundle_identifier: String,
    pub version: String,
    pub version_date: String,
    pub size: u64,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    pub developer_name: String,
    pub localized_description: String,
    #[serde(rename = "iconURL")]
    pub icon_url: String,
}

/// One app with its version history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRecord {
    pub name: String,
    pub bundle_identifier: String,
    pub developer_name: String,
    #[serde(rename = "iconURL")]
    pub icon_url: String,
    pub versions: Vec<VersionEntry>,
}

/// One published version of an app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub version: String,
    pub date: String,
    pub size: u64,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    pub localized_description: String,
}

impl From<&AssetRecord> for VersionEntry {
    fn from(record: &AssetRecord) -> Self {
        Self {
            version: record.version.clone(),
            date: record.version_date.clone(),
            size: record.size,
            download_url: record.download_url.clone(),
            localized_description: record.localized_description.clone(),
        }
    }
}

impl AppRecord {
    fn first_seen(record: &AssetRecord) -> Self {
        Self {
            name: record.name.clone(),
            bundle_identifier: record.bundle_identifier.clone(),
            developer_name: record.developer_name.clone(),
            icon_url: record.icon_url.clone(),
            versions: Vec::new(),
        }
    }

    /// Newest version entry
    pub fn latest(&self) -> Option<&VersionEntry> {
        self.versions.first()
    }

    /// Report app-level fields that differ from the first-seen values
    fn note_conflicts(&self, record: &AssetRecord) {
        let fields = [
            ("bundleIdentifier", &self.bundle_identifier, &record.bundle_identifier),
            ("developerName", &self.developer_name, &record.developer_name),
            ("iconURL", &self.icon_url, &record.icon_url),
        ];
        for (field, kept, seen) in fields {
            if kept != seen {
                tracing::warn!(
                    "App '{}' has conflicting {}: keeping '{}', ignoring '{}' (version {})",
                    self.name,
                    field,
                    kept,
                    seen,
                    record.version
                );
            }
        }
    }
}

/// Group flat records by app name
///
/// Apps appear in order of first occurrence and keep the bundle identifier,
/// developer and icon of their first record. Each app's versions are sorted
/// by date, newest first; equal dates keep their input order.
pub fn transform(records: &[AssetRecord]) -> Vec<AppRecord> {
    let mut apps: IndexMap<&str, AppRecord> = IndexMap::new();

    for record in records {
        let app = apps
            .entry(record.name.as_str())
            .or_insert_with(|| AppRecord::first_seen(record));
        app.note_conflicts(record);
        app.versions.push(VersionEntry::from(record));
    }

    apps.into_values()
        .map(|mut app| {
            app.versions.sort_by(|a, b| b.date.cmp(&a.date));
            app
        })
        .collect()
}

/// A feed file: a JSON object whose `apps` key is rebuilt every run
///
/// All other top-level keys are carried through untouched and in their
/// original order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedDocument {
    fields: Map<String, Value>,
}

impl FeedDocument {
    pub fn from_json(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content).context("Failed to parse feed JSON")?;
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => anyhow::bail!(
                "Feed must be a JSON object, found {}",
                json_kind(&other)
            ),
        }
    }

    /// Load the previous feed; a missing file starts an empty document
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "No existing feed at {}, starting from an empty document",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read feed: {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid feed: {}", path.display()))
    }

    /// Top-level value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Copy of this document with `apps` replaced
    ///
    /// `apps` keeps its position if present, otherwise it is appended.
    pub fn with_apps<T: Serialize>(&self, apps: &[T]) -> Result<Value> {
        let mut fields = self.fields.clone();
        fields.insert(
            "apps".to_string(),
            serde_json::to_value(apps).context("Failed to serialize apps")?,
        );
        Ok(Value::Object(fields))
    }

    /// Write the document with `apps` replaced, pretty-printed
    pub fn write_with_apps<T: Serialize>(&self, path: &Path, apps: &[T]) -> Result<()> {
        let value = self.with_apps(apps)?;
        let mut content = serde_json::to_string_pretty(&value)?;
        content.push('\n');

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write feed: {}", path.display()))?;

        tracing::debug!("Wrote {} apps to {}", apps.len(), path.display());
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, version: &str, date: &str) -> AssetRecord {
        AssetRecord {
            name: name.to_string(),
            bundle_identifier: format!("com.example.{}", name.to_lowercase()),
            version: version.to_string(),
            version_date: date.to_string(),
            size: 100,
            download_url: format!("https://dl.example.com/{name}-{version}.ipa"),
            developer_name: "dev".to_string(),
            localized_description: String::new(),
            icon_url: format!("https://icons.example.com/{name}.png"),
        }
    }

    #[test]
    fn test_transform_groups_and_sorts() {
        let records = vec![
            record("Foo", "1.0", "2024-01-15"),
            record("Bar", "0.1", "2023-06-01"),
            record("Foo", "2.0", "2024-03-01"),
            record("Foo", "1.5", "2024-02-01"),
        ];

        let apps = transform(&records);
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].name, "Foo");
        assert_eq!(apps[1].name, "Bar");

        let dates: Vec<&str> = apps[0].versions.iter().map(|v| v.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-02-01", "2024-01-15"]);
        assert_eq!(apps[0].latest().unwrap().version, "2.0");
    }

    #[test]
    fn test_transform_preserves_count() {
        let records: Vec<AssetRecord> = (0..25)
            .map(|i| {
                record(
                    &format!("App{}", i % 4),
                    &i.to_string(),
                    &format!("2024-01-{:02}", i + 1),
                )
            })
            .collect();

        let apps = transform(&records);
        let total: usize = apps.iter().map(|a| a.versions.len()).sum();
        assert_eq!(total, records.len());
        assert_eq!(apps.len(), 4);
    }

    #[test]
    fn test_transform_first_seen_wins() {
        let mut later = record("Foo", "2.0", "2024-03-01");
        later.bundle_identifier = "com.other.foo".to_string();
        later.developer_name = "someone else".to_string();

        let apps = transform(&[record("Foo", "1.0", "2024-01-01"), later]);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].bundle_identifier, "com.example.foo");
        assert_eq!(apps[0].developer_name, "dev");
        assert_eq!(apps[0].versions.len(), 2);
    }

    #[test]
    fn test_transform_equal_dates_stable() {
        let apps = transform(&[
            record("Foo", "a", "2024-01-01"),
            record("Foo", "b", "2024-01-01"),
            record("Foo", "c", "2024-02-01"),
        ]);
        let versions: Vec<&str> = apps[0].versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(versions, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_transform_empty() {
        assert!(transform(&[]).is_empty());
    }

    #[test]
    fn test_record_serialization_keys() {
        let value = serde_json::to_value(record("Foo", "1.0", "2024-01-01")).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "name",
                "bundleIdentifier",
                "version",
                "versionDate",
                "size",
                "downloadURL",
                "developerName",
                "localizedDescription",
                "iconURL",
            ]
        );

        let app = &transform(&[record("Foo", "1.0", "2024-01-01")])[0];
        let value = serde_json::to_value(app).unwrap();
        assert_eq!(value["iconURL"], "https://icons.example.com/Foo.png");
        assert_eq!(value["versions"][0]["date"], "2024-01-01");
        assert_eq!(
            value["versions"][0]["downloadURL"],
            "https://dl.example.com/Foo-1.0.ipa"
        );
    }

    #[test]
    fn test_feed_document_keeps_other_keys_in_order() {
        let doc = FeedDocument::from_json(
            r#"{"name": "My Store", "apps": [{"old": true}], "identifier": "store.id", "news": []}"#,
        )
        .unwrap();

        let value = doc.with_apps(&[record("Foo", "1.0", "2024-01-01")]).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["name", "apps", "identifier", "news"]);
        assert_eq!(value["name"], "My Store");
        assert_eq!(value["apps"].as_array().unwrap().len(), 1);
        assert_eq!(value["apps"][0]["name"], "Foo");
    }

    #[test]
    fn test_feed_document_appends_missing_apps() {
        let doc = FeedDocument::from_json(r#"{"name": "Store"}"#).unwrap();
        let value = doc.with_apps::<AssetRecord>(&[]).unwrap();
        assert_eq!(value, serde_json::json!({"name": "Store", "apps": []}));
    }

    #[test]
    fn test_feed_document_rejects_non_object() {
        let err = FeedDocument::from_json("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_feed_document_missing_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let doc = FeedDocument::load(&temp_dir.path().join("apps.json")).unwrap();
        assert_eq!(doc, FeedDocument::default());
    }
}
