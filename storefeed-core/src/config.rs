//! Feed run configuration
//!
//! ## Configuration Sources (in precedence order)
//!
//! 1. `--config <path>` - Explicit file (must exist)
//! 2. `./storefeed.json` - Project-level config
//! 3. `~/.config/storefeed/config.json` - Global config
//! 4. Built-in defaults
//!
//! Every field is optional in the file; missing fields fall back to the
//! defaults below, so `{}` is a valid config.
//!
//! ```json
//! {"repository": "owner/repo", "timeout_seconds": 30}
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project-level config file name
pub const PROJECT_CONFIG_FILE: &str = "storefeed.json";

/// Top-level feed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Repository whose releases are harvested, as `owner/name`
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Base URL of the releases API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// File extension (without dot) that marks a package asset
    #[serde(default = "default_package_extension")]
    pub package_extension: String,

    /// Static hosting path for conventionally-named icons
    #[serde(default = "default_icon_base_url")]
    pub icon_base_url: String,

    /// Image search endpoint used when the direct icon is missing
    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,

    /// Environment variable holding the releases API token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Environment variable holding the image search API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Client timeout for every HTTP call; no timeout when unset
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Grouped feed; also read as the template for both outputs
    #[serde(default = "default_feed_path")]
    pub feed_path: PathBuf,

    /// Flat per-asset feed
    #[serde(default = "default_flat_feed_path")]
    pub flat_feed_path: PathBuf,

    /// Identifier cache CSV
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Markdown document holding the description table
    #[serde(default = "default_readme_path")]
    pub readme_path: PathBuf,

    /// Directory receiving downloaded icons
    #[serde(default = "default_icons_dir")]
    pub icons_dir: PathBuf,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            api_base: default_api_base(),
            package_extension: default_package_extension(),
            icon_base_url: default_icon_base_url(),
            search_endpoint: default_search_endpoint(),
            token_env: default_token_env(),
            api_key_env: default_api_key_env(),
            timeout_seconds: None,
            feed_path: default_feed_path(),
            flat_feed_path: default_flat_feed_path(),
            cache_path: default_cache_path(),
            readme_path: default_readme_path(),
            icons_dir: default_icons_dir(),
        }
    }
}

fn default_repository() -> String {
    "swaggyP36000/TrollStore-IPAs".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_package_extension() -> String {
    "ipa".to_string()
}

fn default_icon_base_url() -> String {
    "https://raw.githubusercontent.com/iStoreBox-Dev/IPAs/main/icons".to_string()
}

fn default_search_endpoint() -> String {
    "https://google.serper.dev/images".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_api_key_env() -> String {
    "SERPER_API_KEY".to_string()
}

fn default_feed_path() -> PathBuf {
    PathBuf::from("apps.json")
}

fn default_flat_feed_path() -> PathBuf {
    PathBuf::from("apps_esign.json")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("bundleId.csv")
}

fn default_readme_path() -> PathBuf {
    PathBuf::from("README.md")
}

fn default_icons_dir() -> PathBuf {
    PathBuf::from("icons")
}

impl FeedConfig {
    /// Parse configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse storefeed config JSON")
    }

    /// Load configuration from a specific file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Resolve configuration using the standard precedence
    ///
    /// An explicit path must exist. Project and global files are optional;
    /// when neither exists the built-in defaults are used.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_in(explicit, Path::new("."), global_config_path().as_deref())
    }

    /// Resolution with the project directory and global file made explicit
    pub fn resolve_in(
        explicit: Option<&Path>,
        project_dir: &Path,
        global_path: Option<&Path>,
    ) -> Result<Self> {
        if let Some(path) = explicit {
            tracing::debug!("Using config from {}", path.display());
            return Self::load_from_path(path);
        }

        let project_path = project_dir.join(PROJECT_CONFIG_FILE);
        if project_path.is_file() {
            tracing::debug!("Using project config {}", project_path.display());
            return Self::load_from_path(&project_path);
        }

        if let Some(global) = global_path.filter(|p| p.is_file()) {
            tracing::debug!("Using global config {}", global.display());
            return Self::load_from_path(global);
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Split `repository` into `(owner, name)`
    pub fn repository_parts(&self) -> Result<(&str, &str)> {
        self.repository
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .with_context(|| {
                format!(
                    "Repository must be in 'owner/name' form, got '{}'",
                    self.repository
                )
            })
    }

    /// HTTP client timeout, if one is configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }

    /// Token from the configured environment variable
    pub fn token_from_env(&self) -> Option<String> {
        non_empty_env(&self.token_env)
    }

    /// Image search key from the configured environment variable
    pub fn api_key_from_env(&self) -> Option<String> {
        non_empty_env(&self.api_key_env)
    }
}

/// Default location of the global config file
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("storefeed").join("config.json"))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
