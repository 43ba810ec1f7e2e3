//! Error types for docsync.
//!
//! Library crates use [`DocSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! [`FetchError`] is kept separate: a failed page is recorded as an
//! [`Omission`](crate::Omission) and the run carries on with the pages it has.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for all docsync operations.
#[derive(Debug, thiserror::Error)]
pub enum DocSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network setup error (the HTTP client could not be built).
    #[error("network error: {0}")]
    Network(String),

    /// The narrative document could not be split into sections.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// An edit left the narrative in an invalid state. Always a planner/editor bug.
    #[error("apply error: {message}")]
    Apply { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocSyncError>;

impl DocSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create an apply error from any displayable message.
    pub fn apply(msg: impl Into<String>) -> Self {
        Self::Apply {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a single page could not be added to the corpus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, body read).
    #[error("{url}: {message}")]
    Network { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// The response was not a text document.
    #[error("{url}: unsupported content type '{content_type}'")]
    NonText { url: String, content_type: String },

    /// The body could not be turned into Markdown.
    #[error("{url}: unreadable content: {message}")]
    Unreadable { url: String, message: String },

    /// The run deadline passed before the page arrived.
    #[error("{url}: timed out before the run deadline")]
    TimedOut { url: String },

    /// Refused by SSRF protection.
    #[error("{url}: blocked private or non-HTTP target")]
    Blocked { url: String },
}

impl FetchError {
    /// The URL the failure refers to.
    pub fn url(&self) -> &str {
        match self {
            Self::Network { url, .. }
            | Self::Status { url, .. }
            | Self::NonText { url, .. }
            | Self::Unreadable { url, .. }
            | Self::TimedOut { url }
            | Self::Blocked { url } => url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DocSyncError::parse("no sections found");
        assert_eq!(err.to_string(), "parse error: no sections found");

        let err = DocSyncError::apply("positions not contiguous at 3");
        assert!(err.to_string().contains("positions not contiguous"));
    }

    #[test]
    fn fetch_error_display_keeps_url() {
        let fetch = FetchError::Status {
            url: "https://docs.example.com/a".into(),
            status: 503,
        };
        assert_eq!(fetch.url(), "https://docs.example.com/a");
        assert_eq!(fetch.to_string(), "https://docs.example.com/a: HTTP 503");
    }

    #[test]
    fn fetch_error_serializes_with_kind_tag() {
        let fetch = FetchError::TimedOut {
            url: "https://docs.example.com/slow".into(),
        };
        let json = serde_json::to_value(&fetch).expect("serialize");
        assert_eq!(json["kind"], "timed_out");
        assert_eq!(json["url"], "https://docs.example.com/slow");
    }
}
