use thiserror::Error;

/// Failures raised by the external collaborators of a feed run.
///
/// Orchestration code wraps these in `anyhow` with context; the pipeline
/// downgrades most of them to a diagnostic and moves on.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP {status} from {url}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Package archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Info.plist parse error: {0}")]
    Plist(#[from] plist::Error),

    #[error("No Payload/*.app/Info.plist found in package")]
    MissingInfoPlist,

    #[error("Info.plist has no CFBundleIdentifier")]
    MissingBundleIdentifier,

    #[error("Invalid bundle identifier: {0:?}")]
    InvalidBundleIdentifier(String),

    #[error("Info.plist exceeds {limit} bytes")]
    InfoPlistTooLarge { limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl FeedError {
    pub(crate) fn transport(url: &str, source: reqwest::Error) -> Self {
        FeedError::Transport {
            url: url.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
