//! Error types for the offline cache layer

use std::fmt;

#[derive(Debug)]
pub enum OfflineCacheError {
    Io(Box<std::io::Error>),
    Http(Box<reqwest::Error>),
    Serialization(String),
    /// Transport-level failure reported by a non-HTTP fetcher
    Network(String),
    InvalidUrl(String),
    InvalidPartition(String),
    Seed { url: String, reason: String },
    InvalidTransition { from: String, to: String },
    Payload(String),
}

impl fmt::Display for OfflineCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfflineCacheError::Io(err) => write!(f, "IO error: {}", err),
            OfflineCacheError::Http(err) => write!(f, "HTTP error: {}", err),
            OfflineCacheError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            OfflineCacheError::Network(msg) => write!(f, "Network error: {}", msg),
            OfflineCacheError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            OfflineCacheError::InvalidPartition(name) => {
                write!(f, "Invalid partition name: {}", name)
            }
            OfflineCacheError::Seed { url, reason } => {
                write!(f, "Failed to seed {}: {}", url, reason)
            }
            OfflineCacheError::InvalidTransition { from, to } => {
                write!(f, "Invalid lifecycle transition from {} to {}", from, to)
            }
            OfflineCacheError::Payload(msg) => write!(f, "Invalid push payload: {}", msg),
        }
    }
}

impl std::error::Error for OfflineCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OfflineCacheError::Io(err) => Some(err.as_ref()),
            OfflineCacheError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OfflineCacheError {
    fn from(err: std::io::Error) -> Self {
        OfflineCacheError::Io(Box::new(err))
    }
}

impl From<reqwest::Error> for OfflineCacheError {
    fn from(err: reqwest::Error) -> Self {
        OfflineCacheError::Http(Box::new(err))
    }
}

impl From<serde_json::Error> for OfflineCacheError {
    fn from(err: serde_json::Error) -> Self {
        OfflineCacheError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for OfflineCacheError {
    fn from(err: url::ParseError) -> Self {
        OfflineCacheError::InvalidUrl(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OfflineCacheError>;
