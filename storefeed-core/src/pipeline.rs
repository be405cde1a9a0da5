//! Single-pass feed build
//!
//! ```text
//! releases ─▶ package assets ─▶ bundle id (cache ▸ resolver)
//!                                   │
//!          description table ───────┤
//!                                   ▼
//!                              icon resolver ─▶ AssetRecord
//!
//! records ─▶ bundleId.csv, apps_esign.json (flat), apps.json (grouped)
//! ```
//!
//! Everything runs sequentially. Per-asset failures are logged and the run
//! continues; only unreadable inputs, the release listing and output
//! writes abort it.

use anyhow::{Context, Result};
use std::collections::HashMap;

use crate::bundle_cache::IdentifierCache;
use crate::config::FeedConfig;
use crate::descriptions::DescriptionTable;
use crate::feed::{transform, AppRecord, AssetRecord, FeedDocument};
use crate::icons::{IconOutcome, IconResolver, IconSource};
use crate::releases::{package_stem, parse_asset_stem, Release, ReleaseAsset, ReleaseSource};
use crate::resolver::BundleIdResolver;

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub releases: usize,
    pub assets: usize,
    pub skipped_assets: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub icons_direct: usize,
    pub icons_searched: usize,
    pub icons_unresolved: usize,
    pub apps: usize,
}

impl RunSummary {
    fn record_icon(&mut self, source: IconSource) {
        match source {
            IconSource::Direct => self.icons_direct += 1,
            IconSource::Searched => self.icons_searched += 1,
            IconSource::Unresolved => self.icons_unresolved += 1,
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub records: Vec<AssetRecord>,
    pub apps: Vec<AppRecord>,
}

/// The feed build with its external collaborators
pub struct Pipeline {
    config: FeedConfig,
    releases: Box<dyn ReleaseSource>,
    resolver: Box<dyn BundleIdResolver>,
    icons: IconResolver,
}

impl Pipeline {
    pub fn new(
        config: FeedConfig,
        releases: Box<dyn ReleaseSource>,
        resolver: Box<dyn BundleIdResolver>,
        icons: IconResolver,
    ) -> Self {
        Self {
            config,
            releases,
            resolver,
            icons,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Build both feeds and persist the identifier cache
    pub async fn run(&self) -> Result<RunOutput> {
        let document = FeedDocument::load(&self.config.feed_path)?;
        let mut cache = IdentifierCache::load(&self.config.cache_path)?;
        let descriptions = DescriptionTable::load(&self.config.readme_path)?;
        self.icons.prepare()?;

        let releases = self
            .releases
            .releases()
            .await
            .context("Failed to list releases")?;

        let mut summary = RunSummary::default();
        let records = self
            .harvest(&releases, &mut cache, &descriptions, &mut summary)
            .await;

        cache.persist()?;
        document.write_with_apps(&self.config.flat_feed_path, &records)?;

        let apps = transform(&records);
        document.write_with_apps(&self.config.feed_path, &apps)?;
        summary.apps = apps.len();

        tracing::info!(
            "Built feed: {} apps from {} assets across {} releases ({} skipped)",
            summary.apps,
            summary.assets,
            summary.releases,
            summary.skipped_assets
        );

        Ok(RunOutput {
            summary,
            records,
            apps,
        })
    }

    /// Turn every qualifying asset into a flat record
    pub async fn harvest(
        &self,
        releases: &[Release],
        cache: &mut IdentifierCache,
        descriptions: &DescriptionTable,
        summary: &mut RunSummary,
    ) -> Vec<AssetRecord> {
        let mut records = Vec::new();
        let mut icons: HashMap<(String, String), IconOutcome> = HashMap::new();
        let mut icon_owners: HashMap<String, String> = HashMap::new();

        for release in releases {
            summary.releases += 1;
            tracing::info!("{}", release.title());

            for asset in &release.assets {
                let Some(stem) = package_stem(&asset.name, &self.config.package_extension) else {
                    tracing::trace!("Skipping non-package asset {}", asset.name);
                    continue;
                };
                let (app_name, version) = parse_asset_stem(stem);

                let Some(bundle_id) = self.bundle_id_for(app_name, asset, cache, summary).await
                else {
                    summary.skipped_assets += 1;
                    continue;
                };

                let (localized_description, developer_name) = descriptions
                    .describe(app_name)
                    .map(|d| (d.localized_description(), d.developer_name().to_string()))
                    .unwrap_or_default();

                let key = (app_name.to_string(), bundle_id.clone());
                let icon = match icons.get(&key) {
                    Some(known) => known.clone(),
                    None => {
                        match icon_owners.get(&bundle_id) {
                            Some(owner) => tracing::warn!(
                                "Apps {} and {} share bundle id {}; the icon file is overwritten",
                                owner,
                                app_name,
                                bundle_id
                            ),
                            None => {
                                icon_owners.insert(bundle_id.clone(), app_name.to_string());
                            }
                        }
                        let outcome = self
                            .icons
                            .resolve(app_name, &developer_name, &bundle_id)
                            .await;
                        summary.record_icon(outcome.source);
                        icons.insert(key, outcome.clone());
                        outcome
                    }
                };

                summary.assets += 1;
                records.push(AssetRecord {
                    name: app_name.to_string(),
                    bundle_identifier: bundle_id,
                    version: version.to_string(),
                    version_date: asset.version_date(),
                    size: asset.size,
                    download_url: asset.browser_download_url.clone(),
                    developer_name,
                    localized_description,
                    icon_url: icon.url,
                });
            }
        }

        records
    }

    /// Cached identifier, or resolve and cache it
    async fn bundle_id_for(
        &self,
        app_name: &str,
        asset: &ReleaseAsset,
        cache: &mut IdentifierCache,
        summary: &mut RunSummary,
    ) -> Option<String> {
        if let Some(cached) = cache.lookup(app_name) {
            tracing::debug!("Bundle id cache hit for {}: {}", app_name, cached);
            summary.cache_hits += 1;
            return Some(cached.to_string());
        }

        summary.cache_misses += 1;
        match self.resolver.resolve(&asset.browser_download_url).await {
            Ok(bundle_id) => {
                tracing::debug!("Resolved bundle id for {}: {}", app_name, bundle_id);
                cache.insert(app_name, &bundle_id);
                Some(bundle_id)
            }
            Err(e) => {
                tracing::warn!(
                    "Skipping {}: could not resolve bundle id from {}: {}",
                    asset.name,
                    asset.browser_download_url,
                    e
                );
                None
            }
        }
    }
}
