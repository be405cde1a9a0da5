//! End-of-run reporting

use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::info;

use storefeed_core::{AppRecord, RunSummary};

#[derive(Tabled)]
struct AppRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Bundle ID")]
    bundle_identifier: String,
    #[tabled(rename = "Versions")]
    versions: usize,
    #[tabled(rename = "Latest")]
    latest_version: String,
    #[tabled(rename = "Date")]
    latest_date: String,
}

impl From<&AppRecord> for AppRow {
    fn from(app: &AppRecord) -> Self {
        let latest = app.latest();
        Self {
            name: app.name.clone(),
            bundle_identifier: app.bundle_identifier.clone(),
            versions: app.versions.len(),
            latest_version: latest.map(|v| v.version.clone()).unwrap_or_default(),
            latest_date: latest.map(|v| v.date.clone()).unwrap_or_default(),
        }
    }
}

pub fn log_summary(summary: &RunSummary) {
    info!(
        releases = summary.releases,
        assets = summary.assets,
        skipped = summary.skipped_assets,
        "Harvest complete"
    );
    info!(
        hits = summary.cache_hits,
        misses = summary.cache_misses,
        "Bundle id cache"
    );
    info!(
        direct = summary.icons_direct,
        searched = summary.icons_searched,
        unresolved = summary.icons_unresolved,
        "Icons"
    );
}

pub fn render_apps_table(apps: &[AppRecord]) -> String {
    if apps.is_empty() {
        return "No apps found.".to_string();
    }

    let rows: Vec<AppRow> = apps.iter().map(AppRow::from).collect();

    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefeed_core::VersionEntry;

    fn app(name: &str, versions: &[(&str, &str)]) -> AppRecord {
        AppRecord {
            name: name.to_string(),
            bundle_identifier: format!("com.example.{name}"),
            developer_name: String::new(),
            icon_url: String::new(),
            versions: versions
                .iter()
                .map(|(version, date)| VersionEntry {
                    version: version.to_string(),
                    date: date.to_string(),
                    size: 0,
                    download_url: String::new(),
                    localized_description: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_render_table() {
        let table = render_apps_table(&[
            app("foo", &[("2.0", "2024-03-01"), ("1.0", "2024-01-01")]),
            app("bar", &[]),
        ]);
        assert!(table.contains("Bundle ID"));
        assert!(table.contains("com.example.foo"));
        assert!(table.contains("2024-03-01"));
        assert!(!table.contains("2024-01-01"));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_apps_table(&[]), "No apps found.");
    }
}
