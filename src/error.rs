use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cached file is missing or empty: {0}")]
    Empty(PathBuf),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// How the resolver should treat a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    NotConfigured,
    Transient,
    Auth,
    Parse,
    CacheWrite,
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider is not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed with HTTP {status}")]
    Auth { status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Cache write failed: {0}")]
    Cache(#[from] CacheError),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::NotConfigured(_) => ProviderErrorKind::NotConfigured,
            ProviderError::Network(_) => ProviderErrorKind::Transient,
            ProviderError::Auth { .. } => ProviderErrorKind::Auth,
            ProviderError::Parse(_) => ProviderErrorKind::Parse,
            ProviderError::Cache(_) => ProviderErrorKind::CacheWrite,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ProviderError::Parse(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                ProviderError::Auth {
                    status: status.as_u16(),
                }
            }
            _ => ProviderError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Parse(err.to_string())
    }
}

impl From<url::ParseError> for ProviderError {
    fn from(err: url::ParseError) -> Self {
        ProviderError::NotConfigured(format!("invalid URL: {}", err))
    }
}

/// Failure reported by the native player layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("Attach call failed: {0}")]
    Attach(String),

    #[error("Track selection failed: {0}")]
    SelectTrack(String),

    #[error("Session restart failed: {0}")]
    Restart(String),

    #[error("Session did not report playing within {0} ms")]
    PlayingTimeout(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    #[error("Subtitle file does not exist or is empty: {0}")]
    MissingFile(PathBuf),

    #[error("Session has no media source")]
    NoMediaSource,

    #[error("Subtitle could not be loaded")]
    Exhausted,

    #[error("Attachment cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Could not determine config path")]
    NoConfigPath,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}
