//! Error type definitions for the catalog core
//!
//! This module defines the error hierarchy used throughout the crate. Feed-level
//! failures are caught close to where they happen and only surface here when a
//! caller needs to react to them (validation, persistence, guide building).

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Durable storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Source list and validation errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Guide parsing and artifact errors
    #[error("Guide error: {0}")]
    Guide(#[from] GuideError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable key/value storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading a key failed
    #[error("Failed to read key '{key}': {message}")]
    ReadFailed { key: String, message: String },

    /// Writing a key failed
    #[error("Failed to write key '{key}': {message}")]
    WriteFailed { key: String, message: String },

    /// Stored value could not be decoded
    #[error("Corrupt value for key '{key}': {message}")]
    Corrupt { key: String, message: String },
}

/// Errors raised while fetching feeds or accepting new sources
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The url does not look like an http(s) url
    #[error("Invalid URL format: {url}")]
    InvalidFormat { url: String },

    /// The url could not be fetched
    #[error("Cannot reach {url}: {message}")]
    Unreachable { url: String, message: String },

    /// The url was fetched but is not an M3U playlist
    #[error("Not a valid M3U playlist: {url}")]
    NotAPlaylist { url: String },

    /// The url is already configured
    #[error("Source already exists: {url}")]
    AlreadyExists { url: String },

    /// The url is not configured
    #[error("Source not found: {url}")]
    NotFound { url: String },

    /// Non-success HTTP status from a feed
    #[error("HTTP error: {status} - {url}")]
    Http { status: u16, url: String },

    /// Feed body could not be decoded
    #[error("Failed to decode feed {url}: {message}")]
    Decode { url: String, message: String },
}

/// Guide (XMLTV) parsing and artifact errors
#[derive(Error, Debug)]
pub enum GuideError {
    /// Malformed XML document
    #[error("XML parsing error: {0}")]
    Xml(String),

    /// Document root is neither `tv` nor `epg`
    #[error("Unsupported guide schema: root element '{root}'")]
    UnsupportedSchema { root: String },

    /// XMLTV datetime token could not be parsed
    #[error("Invalid XMLTV datetime: '{input}'")]
    InvalidDateTime { input: String },
}

impl AppError {
    /// Create a configuration error with a custom message
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl StorageError {
    pub fn read_failed<K: Into<String>, M: ToString>(key: K, message: M) -> Self {
        Self::ReadFailed {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn write_failed<K: Into<String>, M: ToString>(key: K, message: M) -> Self {
        Self::WriteFailed {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn corrupt<K: Into<String>, M: ToString>(key: K, message: M) -> Self {
        Self::Corrupt {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

impl SourceError {
    /// Create an unreachable error
    pub fn unreachable<U: Into<String>, M: ToString>(url: U, message: M) -> Self {
        Self::Unreachable {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Short message suitable for showing to a user
    pub fn user_message(&self) -> &'static str {
        match self {
            SourceError::InvalidFormat { .. } => "Invalid URL format",
            SourceError::Unreachable { .. } | SourceError::Http { .. } => {
                "Cannot reach the URL"
            }
            SourceError::NotAPlaylist { .. } | SourceError::Decode { .. } => {
                "URL is not a valid M3U playlist"
            }
            SourceError::AlreadyExists { .. } => "URL already added",
            SourceError::NotFound { .. } => "URL not found",
        }
    }
}
