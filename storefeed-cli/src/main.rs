//! storefeed - builds an app store feed from repository releases
//!
//! Main entry point: parses flags, resolves configuration and credentials,
//! wires the HTTP collaborators into the core pipeline and runs it once.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use storefeed_core::icons::{HttpIconFetcher, ImageSearch, SerperImageSearch};
use storefeed_core::releases::GithubReleases;
use storefeed_core::resolver::IpaBundleIdResolver;
use storefeed_core::{FeedConfig, IconResolver, Pipeline};

mod summary;

/// Log levels
#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "storefeed",
    about = "Build an app store JSON feed from the package assets of repository releases",
    version
)]
struct Cli {
    /// Access token for the releases API (falls back to the token_env variable)
    #[clap(short = 't', long)]
    token: Option<String>,

    /// Key for the image search API (falls back to the api_key_env variable)
    #[clap(short = 'a', long = "api_key")]
    api_key: Option<String>,

    /// Configuration file (defaults to ./storefeed.json, then the user config dir)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Set log level
    #[clap(long, default_value = "info")]
    log_level: LogLevel,

    /// Emit logs as JSON
    #[clap(long)]
    log_json: bool,

    /// Do not print the per-app summary table
    #[clap(short, long)]
    quiet: bool,
}

/// Credentials after applying flag → environment precedence
#[derive(Debug, Default, PartialEq, Eq)]
struct Credentials {
    token: Option<String>,
    api_key: Option<String>,
}

impl Credentials {
    fn resolve(cli: &Cli, config: &FeedConfig) -> Self {
        Self {
            token: cli.token.clone().or_else(|| config.token_from_env()),
            api_key: cli.api_key.clone().or_else(|| config.api_key_from_env()),
        }
    }
}

/// Initialize tracing with CLI flags
fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::new(log_level.to_filter_directive());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        // stdout is reserved for the summary table
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn build_pipeline(config: FeedConfig, credentials: Credentials) -> Result<Pipeline> {
    let (owner, repo) = config.repository_parts()?;
    let timeout = config.timeout();

    let releases = GithubReleases::new(&config.api_base, owner, repo, credentials.token, timeout)?;
    let resolver = IpaBundleIdResolver::new(timeout)?;

    let search: Option<Box<dyn ImageSearch>> = match credentials.api_key {
        Some(key) => Some(Box::new(SerperImageSearch::new(
            &config.search_endpoint,
            key,
            timeout,
        )?)),
        None => {
            info!("No image search API key configured, icon search is disabled");
            None
        }
    };

    let icons = IconResolver::new(
        Box::new(HttpIconFetcher::new(timeout)?),
        search,
        &config.icon_base_url,
        config.icons_dir.clone(),
    );

    Ok(Pipeline::new(
        config,
        Box::new(releases),
        Box::new(resolver),
        icons,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.log_json);

    let config =
        FeedConfig::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!("Resolved configuration: {:?}", config);

    let credentials = Credentials::resolve(&cli, &config);
    info!("Building feed from {}", config.repository);

    let pipeline = build_pipeline(config, credentials)?;
    let output = pipeline.run().await?;

    summary::log_summary(&output.summary);
    if !cli.quiet {
        println!("{}", summary::render_apps_table(&output.apps));
    }

    Ok(())
}
