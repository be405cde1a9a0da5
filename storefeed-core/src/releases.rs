//! Release harvesting
//!
//! Lists every release of the source repository and turns qualifying
//! assets into `(app name, version, date)` triples.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::FeedError;

/// Version used when an asset filename carries no `-<version>` suffix
pub const DEFAULT_VERSION: &str = "1.0";

/// Releases requested per page
const PER_PAGE: usize = 100;

/// A published release
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub name: Option<String>,
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Display title, falling back to the tag when the release is unnamed
    pub fn title(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.tag_name)
    }
}

/// A downloadable file attached to a release
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub browser_download_url: String,
}

impl ReleaseAsset {
    /// Creation date as `YYYY-MM-DD`
    pub fn version_date(&self) -> String {
        self.created_at.format("%Y-%m-%d").to_string()
    }
}

/// Source of releases for one repository
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Every release, in the order the host returns them
    async fn releases(&self) -> Result<Vec<Release>>;
}

/// Releases API client for a GitHub-compatible host
pub struct GithubReleases {
    client: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl GithubReleases {
    pub fn new(
        api_base: &str,
        owner: &str,
        repo: &str,
        token: Option<String>,
        timeout: Option<std::time::Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(crate::USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        if token.is_none() {
            tracing::info!("No releases API token configured, requests are unauthenticated");
        }

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token,
        })
    }

    fn page_url(&self, page: usize) -> String {
        format!(
            "{}/repos/{}/{}/releases?per_page={}&page={}",
            self.api_base, self.owner, self.repo, PER_PAGE, page
        )
    }

    async fn fetch_page(&self, page: usize) -> Result<Vec<Release>> {
        let url = self.page_url(page);
        tracing::debug!("Fetching releases page {}: {}", page, url);

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FeedError::transport(&url, e))?;

        if !response.status().is_success() {
            return Err(FeedError::Http {
                status: response.status(),
                url,
            }
            .into());
        }

        response
            .json::<Vec<Release>>()
            .await
            .with_context(|| format!("Failed to parse releases from {url}"))
    }
}

#[async_trait]
impl ReleaseSource for GithubReleases {
    async fn releases(&self) -> Result<Vec<Release>> {
        collect_pages(move |page| self.fetch_page(page))
            .await
            .with_context(|| format!("Failed to list releases of {}/{}", self.owner, self.repo))
    }
}

/// Request pages 1, 2, ... until one comes back with fewer than `PER_PAGE` items
async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<T>>>,
{
    let mut all = Vec::new();
    let mut page = 1;

    loop {
        let batch = fetch(page).await?;
        let done = batch.len() < PER_PAGE;
        all.extend(batch);
        if done {
            break;
        }
        page += 1;
    }

    tracing::debug!("Listed {} releases in {} page(s)", all.len(), page);
    Ok(all)
}

/// Strip `.<extension>` from a package asset filename
///
/// Returns `None` for assets that are not packages.
pub fn package_stem<'a>(file_name: &'a str, extension: &str) -> Option<&'a str> {
    file_name
        .strip_suffix(extension)
        .and_then(|rest| rest.strip_suffix('.'))
}

/// Split a package stem into `(app name, version)` on the first hyphen
pub fn parse_asset_stem(stem: &str) -> (&str, &str) {
    stem.split_once('-').unwrap_or((stem, DEFAULT_VERSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_asset_stem() {
        assert_eq!(parse_asset_stem("MyApp-2.3.1"), ("MyApp", "2.3.1"));
        assert_eq!(parse_asset_stem("MyApp"), ("MyApp", "1.0"));
        assert_eq!(parse_asset_stem("My App-1.0-beta"), ("My App", "1.0-beta"));
        assert_eq!(parse_asset_stem("App-"), ("App", ""));
        assert_eq!(parse_asset_stem(""), ("", "1.0"));
    }

    #[test]
    fn test_package_stem() {
        assert_eq!(package_stem("Widget-1.2.ipa", "ipa"), Some("Widget-1.2"));
        assert_eq!(package_stem("Widget.ipa", "ipa"), Some("Widget"));
        assert_eq!(package_stem("Widget-1.2.zip", "ipa"), None);
        assert_eq!(package_stem("notanipa", "ipa"), None);
        assert_eq!(package_stem("source.tar.gz", "ipa"), None);
    }

    #[test]
    fn test_release_title_fallback() {
        let json = r#"[
            {"name": "Weekly drop", "tag_name": "v1", "assets": []},
            {"name": null, "tag_name": "v2", "assets": []},
            {"name": "  ", "tag_name": "v3"}
        ]"#;
        let releases: Vec<Release> = serde_json::from_str(json).unwrap();
        assert_eq!(releases[0].title(), "Weekly drop");
        assert_eq!(releases[1].title(), "v2");
        assert_eq!(releases[2].title(), "v3");
    }

    #[test]
    fn test_asset_deserialize_and_date() {
        let json = r#"{
            "name": "Widget-1.2.ipa",
            "size": 1024,
            "created_at": "2024-05-01T23:59:59Z",
            "browser_download_url": "https://example.com/Widget-1.2.ipa",
            "content_type": "application/octet-stream"
        }"#;
        let asset: ReleaseAsset = serde_json::from_str(json).unwrap();
        assert_eq!(asset.size, 1024);
        assert_eq!(asset.version_date(), "2024-05-01");
    }

    #[test]
    fn test_page_url() {
        let source = GithubReleases::new("https://api.github.com/", "owner", "repo", None, None)
            .unwrap();
        assert_eq!(
            source.page_url(3),
            "https://api.github.com/repos/owner/repo/releases?per_page=100&page=3"
        );
    }

    fn page_of(count: usize, first: usize) -> Vec<Release> {
        (first..first + count)
            .map(|n| Release {
                name: None,
                tag_name: format!("v{n}"),
                assets: Vec::new(),
            })
            .collect()
    }

    /// Serves `pages[n - 1]` for page `n` and records every page requested
    async fn collect_from(pages: Vec<Vec<Release>>) -> Result<(Vec<Release>, Vec<usize>)> {
        let mut requested = Vec::new();
        let all = collect_pages(|page| {
            requested.push(page);
            let batch = pages.get(page - 1).cloned().unwrap_or_default();
            async move { Ok::<_, anyhow::Error>(batch) }
        })
        .await?;
        Ok((all, requested))
    }

    #[tokio::test]
    async fn test_pagination_stops_on_short_page() -> Result<()> {
        let (all, requested) =
            collect_from(vec![page_of(100, 0), page_of(100, 100), page_of(3, 200)]).await?;
        assert_eq!(all.len(), 203);
        assert_eq!(requested, vec![1, 2, 3]);
        assert_eq!(all[0].tag_name, "v0");
        assert_eq!(all[202].tag_name, "v202");
        Ok(())
    }

    #[tokio::test]
    async fn test_pagination_full_page_then_empty() -> Result<()> {
        let (all, requested) = collect_from(vec![page_of(100, 0), Vec::new()]).await?;
        assert_eq!(all.len(), 100);
        assert_eq!(requested, vec![1, 2]);
        Ok(())
    }

    #[tokio::test]
    async fn test_pagination_empty_repository() -> Result<()> {
        let (all, requested) = collect_from(Vec::new()).await?;
        assert!(all.is_empty());
        assert_eq!(requested, vec![1]);
        Ok(())
    }

    #[tokio::test]
    async fn test_pagination_error_propagates() {
        let mut requested = Vec::new();
        let result: Result<Vec<Release>> = collect_pages(|page| {
            requested.push(page);
            let batch: Result<Vec<Release>> = if page == 1 {
                Ok(page_of(100, 0))
            } else {
                Err(anyhow::anyhow!("HTTP 500"))
            };
            async move { batch }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(requested, vec![1, 2]);
    }
}
