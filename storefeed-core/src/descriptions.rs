//! Description table loader
//!
//! Reads per-app description, last-updated date, status and maintainer
//! from a Markdown document. The description table is expected to be the
//! **second** table in the document; anything else is reported and treated
//! as "no description data" rather than guessed at.

use anyhow::{Context, Result};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use std::path::Path;

/// Position of the description table among all tables in the document
pub const DESCRIPTION_TABLE_INDEX: usize = 1;

pub const COL_APP_NAME: &str = "App Name";
pub const COL_DESCRIPTION: &str = "Description";
pub const COL_LAST_UPDATED: &str = "Last Updated";
pub const COL_STATUS: &str = "Status";
pub const COL_MAINTAINER: &str = "Source/Maintainer";

/// A table as found in the Markdown source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkdownTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl MarkdownTable {
    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Collect every table in the document, in order
///
/// Raw HTML `<table>` elements count toward the position of later tables.
/// Their content is not parsed, so they appear as empty tables.
pub fn extract_tables(markdown: &str) -> Vec<MarkdownTable> {
    let mut tables: Vec<MarkdownTable> = Vec::new();
    let mut current: Option<usize> = None;
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<String> = None;

    for event in Parser::new_ext(markdown, Options::ENABLE_TABLES) {
        match event {
            Event::Start(Tag::Table(_)) => {
                current = Some(tables.len());
                tables.push(MarkdownTable::default());
            }
            Event::End(TagEnd::Table) => current = None,
            Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => row.clear(),
            Event::End(TagEnd::TableHead) => {
                if let Some(t) = current.and_then(|i| tables.get_mut(i)) {
                    t.headers = std::mem::take(&mut row);
                }
            }
            Event::End(TagEnd::TableRow) => {
                if let Some(t) = current.and_then(|i| tables.get_mut(i)) {
                    t.rows.push(std::mem::take(&mut row));
                }
            }
            Event::Start(Tag::TableCell) => cell = Some(String::new()),
            Event::End(TagEnd::TableCell) => {
                if let Some(text) = cell.take() {
                    row.push(text.trim().to_string());
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(c) = cell.as_mut() {
                    c.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(c) = cell.as_mut() {
                    c.push(' ');
                }
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let count = count_html_tables(&html);
                tables.extend(std::iter::repeat_with(MarkdownTable::default).take(count));
            }
            _ => {}
        }
    }

    tables
}

/// Number of `<table` start tags in a raw HTML fragment
fn count_html_tables(html: &str) -> usize {
    let lower = html.to_ascii_lowercase();
    lower
        .match_indices("<table")
        .filter(|(at, tag)| {
            lower[at + tag.len()..]
                .chars()
                .next()
                .map_or(true, |c| c == '>' || c == '/' || c.is_ascii_whitespace())
        })
        .count()
}

/// Join key shared by the description table and harvested app names
pub fn normalize_app_name(name: &str) -> String {
    name.replace(' ', "").to_lowercase()
}

/// One row of the description table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppDescription {
    /// Normalized app name
    pub key: String,
    pub description: String,
    pub last_updated: String,
    pub status: String,
    pub maintainer: String,
}

impl AppDescription {
    /// Text used for `localizedDescription`
    pub fn localized_description(&self) -> String {
        format!(
            "{}\nLast updated: {}\nStatus: {}",
            self.description, self.last_updated, self.status
        )
    }

    /// Text used for `developerName`
    pub fn developer_name(&self) -> &str {
        &self.maintainer
    }
}

/// Row-indexable description data keyed by normalized app name
#[derive(Debug, Clone, Default)]
pub struct DescriptionTable {
    rows: Vec<AppDescription>,
}

impl DescriptionTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from a Markdown file; a missing file yields an empty table
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No description document at {}", path.display());
            return Ok(Self::empty());
        }

        let markdown = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Ok(Self::from_markdown(&markdown))
    }

    /// Parse the description table out of a Markdown document
    pub fn from_markdown(markdown: &str) -> Self {
        let tables = extract_tables(markdown);

        let Some(table) = tables.get(DESCRIPTION_TABLE_INDEX) else {
            tracing::warn!(
                "Expected description table not found: document has {} table(s), need at least {}",
                tables.len(),
                DESCRIPTION_TABLE_INDEX + 1
            );
            return Self::empty();
        };

        Self::from_table(table)
    }

    /// Build from an already-selected table
    pub fn from_table(table: &MarkdownTable) -> Self {
        let Some(name_col) = table.column(COL_APP_NAME) else {
            tracing::warn!(
                "Description table has no '{}' column (headers: {:?})",
                COL_APP_NAME,
                table.headers
            );
            return Self::empty();
        };

        let columns = [
            table.column(COL_DESCRIPTION),
            table.column(COL_LAST_UPDATED),
            table.column(COL_STATUS),
            table.column(COL_MAINTAINER),
        ];

        let rows = table
            .rows
            .iter()
            .map(|row| {
                let cell = |col: Option<usize>| {
                    col.and_then(|i| row.get(i)).cloned().unwrap_or_default()
                };
                AppDescription {
                    key: normalize_app_name(&cell(Some(name_col))),
                    description: cell(columns[0]),
                    last_updated: cell(columns[1]),
                    status: cell(columns[2]),
                    maintainer: cell(columns[3]),
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!("Loaded {} description rows", rows.len());
        Self { rows }
    }

    /// First row whose normalized name matches `app_name`
    pub fn describe(&self, app_name: &str) -> Option<&AppDescription> {
        let key = normalize_app_name(app_name);
        self.rows.iter().find(|row| row.key == key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
