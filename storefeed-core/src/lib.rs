//! storefeed library exports
//!
//! Builds an app store feed from the package assets published as releases
//! of a source repository.

pub mod bundle_cache;
pub mod config;
pub mod descriptions;
pub mod error;
pub mod feed;
pub mod icons;
pub mod pipeline;
pub mod releases;
pub mod resolver;

pub use bundle_cache::{IdentifierCache, IdentifierCacheRow};
pub use config::FeedConfig;
pub use descriptions::{normalize_app_name, AppDescription, DescriptionTable};
pub use error::FeedError;
pub use feed::{transform, AppRecord, AssetRecord, FeedDocument, VersionEntry};
pub use icons::{IconOutcome, IconResolver, IconSource};
pub use pipeline::{Pipeline, RunOutput, RunSummary};
pub use releases::{Release, ReleaseAsset, ReleaseSource};
pub use resolver::BundleIdResolver;

/// User agent sent with every HTTP request
pub const USER_AGENT: &str = concat!("storefeed/", env!("CARGO_PKG_VERSION"));
