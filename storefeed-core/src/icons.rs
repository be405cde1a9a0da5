//! Icon resolution
//!
//! Two stages, terminal on the first success:
//!
//! ```text
//! {icon_base_url}/{bundle_id}.png ──ok──▶ Direct
//!        │ fail
//!        ▼
//! image search "{app} {developer} icon" ──first result──▶ download ──ok──▶ Searched
//!        │ no key / no result / fail                          │ fail
//!        ▼                                                    ▼
//!   Unresolved (icon URL stays the direct URL)           Unresolved
//! ```
//!
//! Every successful download is written to `{icons_dir}/{bundle_id}.png`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::FeedError;
use crate::resolver::is_valid_bundle_id;

/// Downloads raw bytes for an icon URL
#[async_trait]
pub trait IconFetcher: Send + Sync {
    /// Body of a successful response; any other outcome is an error
    async fn fetch(&self, url: &str) -> crate::error::Result<Vec<u8>>;
}

/// Image search used when the conventional icon is missing
#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// URL of the first image result, if any
    async fn first_image(&self, query: &str) -> crate::error::Result<Option<String>>;
}

fn http_client(timeout: Option<std::time::Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(crate::USER_AGENT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("Failed to create HTTP client")
}

/// Plain GET fetcher
pub struct HttpIconFetcher {
    client: reqwest::Client,
}

impl HttpIconFetcher {
    pub fn new(timeout: Option<std::time::Duration>) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl IconFetcher for HttpIconFetcher {
    async fn fetch(&self, url: &str) -> crate::error::Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::transport(url, e))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(FeedError::Http {
                status: response.status(),
                url: url.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FeedError::transport(url, e))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    images: Vec<SearchImage>,
}

#[derive(Debug, Deserialize)]
struct SearchImage {
    #[serde(default)]
    url: Option<String>,
}

/// Serper-compatible image search API
pub struct SerperImageSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl SerperImageSearch {
    pub fn new(
        endpoint: &str,
        api_key: String,
        timeout: Option<std::time::Duration>,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ImageSearch for SerperImageSearch {
    async fn first_image(&self, query: &str) -> crate::error::Result<Option<String>> {
        tracing::debug!("Image search: {}", query);

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&SearchRequest { q: query })
            .send()
            .await
            .map_err(|e| FeedError::transport(&self.endpoint, e))?;

        if !response.status().is_success() {
            return Err(FeedError::Http {
                status: response.status(),
                url: self.endpoint.clone(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FeedError::transport(&self.endpoint, e))?;

        first_image_url(&body)
    }
}

/// `images[0].url` from a search response body
fn first_image_url(body: &[u8]) -> crate::error::Result<Option<String>> {
    let parsed: SearchResponse = serde_json::from_slice(body)?;
    Ok(parsed.images.into_iter().next().and_then(|image| image.url))
}

/// Where the icon finally came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconSource {
    Direct,
    Searched,
    Unresolved,
}

/// Result of resolving one app's icon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconOutcome {
    /// URL recorded in the feed
    pub url: String,
    pub source: IconSource,
}

/// Runs the direct-then-search procedure and stores downloaded icons
pub struct IconResolver {
    fetcher: Box<dyn IconFetcher>,
    search: Option<Box<dyn ImageSearch>>,
    base_url: String,
    icons_dir: PathBuf,
}

impl IconResolver {
    pub fn new(
        fetcher: Box<dyn IconFetcher>,
        search: Option<Box<dyn ImageSearch>>,
        base_url: &str,
        icons_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            search,
            base_url: base_url.trim_end_matches('/').to_string(),
            icons_dir: icons_dir.into(),
        }
    }

    /// Conventional icon URL for a bundle identifier
    pub fn direct_url(&self, bundle_id: &str) -> String {
        format!("{}/{}.png", self.base_url, bundle_id)
    }

    /// Local file an icon for `bundle_id` is written to
    pub fn icon_path(&self, bundle_id: &str) -> PathBuf {
        self.icons_dir.join(format!("{bundle_id}.png"))
    }

    pub fn icons_dir(&self) -> &Path {
        &self.icons_dir
    }

    /// Create the icons directory
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.icons_dir).with_context(|| {
            format!(
                "Failed to create icons directory: {}",
                self.icons_dir.display()
            )
        })
    }

    /// Resolve the icon for one app; never fails the caller
    pub async fn resolve(
        &self,
        app_name: &str,
        developer_name: &str,
        bundle_id: &str,
    ) -> IconOutcome {
        let direct = self.direct_url(bundle_id);
        if !is_valid_bundle_id(bundle_id) {
            tracing::warn!(
                "Icon not resolved for {}: bundle id {:?} is not a valid file name",
                app_name,
                bundle_id
            );
            return IconOutcome {
                url: direct,
                source: IconSource::Unresolved,
            };
        }
        let path = self.icon_path(bundle_id);

        match self.download(&direct, &path).await {
            Ok(()) => {
                return IconOutcome {
                    url: direct,
                    source: IconSource::Direct,
                }
            }
            Err(e) => tracing::debug!("Direct icon for {} unavailable: {:#}", app_name, e),
        }

        let unresolved = IconOutcome {
            url: direct,
            source: IconSource::Unresolved,
        };

        let Some(search) = &self.search else {
            tracing::warn!("Icon not found for {} (image search disabled)", app_name);
            return unresolved;
        };

        let query = format!("{app_name} {developer_name} icon");
        let found = match search.first_image(&query).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!("Image search for {} failed: {}", app_name, e);
                None
            }
        };

        let Some(search_url) = found else {
            tracing::warn!("Icon not found for {}", app_name);
            return unresolved;
        };

        match self.download(&search_url, &path).await {
            Ok(()) => IconOutcome {
                url: search_url,
                source: IconSource::Searched,
            },
            Err(e) => {
                tracing::warn!("Failed to download searched icon for {}: {:#}", app_name, e);
                unresolved
            }
        }
    }

    async fn download(&self, url: &str, path: &Path) -> Result<()> {
        let bytes = self.fetcher.fetch(url).await?;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to write icon: {}", path.display()))?;
        tracing::debug!("Saved icon {} from {}", path.display(), url);
        Ok(())
    }
}
