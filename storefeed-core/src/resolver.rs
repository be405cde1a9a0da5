//! Bundle identifier resolution
//!
//! Downloads a package and reads `CFBundleIdentifier` out of the
//! `Payload/<Name>.app/Info.plist` inside it.

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{FeedError, Result};

/// Upper bound on the size of the app's Info.plist
pub const MAX_INFO_PLIST_BYTES: u64 = 1024 * 1024;

/// Derives a bundle identifier from a package download URL
#[async_trait]
pub trait BundleIdResolver: Send + Sync {
    async fn resolve(&self, download_url: &str) -> Result<String>;
}

/// Resolver that inspects the downloaded package archive
pub struct IpaBundleIdResolver {
    client: reqwest::Client,
}

impl IpaBundleIdResolver {
    pub fn new(timeout: Option<std::time::Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(crate::USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BundleIdResolver for IpaBundleIdResolver {
    async fn resolve(&self, download_url: &str) -> Result<String> {
        tracing::debug!("Downloading package to resolve bundle id: {}", download_url);

        let mut response = self
            .client
            .get(download_url)
            .send()
            .await
            .map_err(|e| FeedError::transport(download_url, e))?;

        if !response.status().is_success() {
            return Err(FeedError::Http {
                status: response.status(),
                url: download_url.to_string(),
            });
        }

        // Packages can be large; spool to disk instead of memory
        let mut file = tempfile::tempfile()?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FeedError::transport(download_url, e))?
        {
            file.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        tracing::debug!("Downloaded {} bytes from {}", written, download_url);

        file.seek(SeekFrom::Start(0))?;
        bundle_id_from_package(file)
    }
}

#[derive(Deserialize)]
struct InfoPlist {
    #[serde(rename = "CFBundleIdentifier")]
    bundle_identifier: Option<String>,
}

/// Whether `path` is `Payload/<Name>.app/Info.plist`
fn is_app_info_plist(path: &str) -> bool {
    let mut parts = path.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some("Payload"), Some(app), Some("Info.plist"), None) if app.ends_with(".app")
    )
}

/// Whether `id` is safe to use as a file name and URL path segment
///
/// Accepts ASCII letters, digits, `.`, `-` and `_`, with no leading dot
/// and no `..` run.
pub fn is_valid_bundle_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && !id.contains("..")
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// Read the bundle identifier from a package archive
pub fn bundle_id_from_package<R: Read + Seek>(reader: R) -> Result<String> {
    read_bundle_id(reader, MAX_INFO_PLIST_BYTES)
}

fn read_bundle_id<R: Read + Seek>(reader: R, plist_limit: u64) -> Result<String> {
    let mut archive = zip::ZipArchive::new(reader)?;

    let index = (0..archive.len())
        .find(|&i| {
            archive
                .name_for_index(i)
                .map(is_app_info_plist)
                .unwrap_or(false)
        })
        .ok_or(FeedError::MissingInfoPlist)?;

    // The declared entry size is untrusted; read at most one byte past the limit
    let entry = archive.by_index(index)?;
    let mut plist_bytes = Vec::new();
    entry.take(plist_limit + 1).read_to_end(&mut plist_bytes)?;
    if plist_bytes.len() as u64 > plist_limit {
        return Err(FeedError::InfoPlistTooLarge { limit: plist_limit });
    }

    let info: InfoPlist = plist::from_bytes(&plist_bytes)?;
    let id = info
        .bundle_identifier
        .filter(|id| !id.trim().is_empty())
        .ok_or(FeedError::MissingBundleIdentifier)?;

    if !is_valid_bundle_id(&id) {
        return Err(FeedError::InvalidBundleIdentifier(id));
    }
    Ok(id)
}
