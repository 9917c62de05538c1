//! Error types for OTWatch.
//!
//! Library crates use [`OtWatchError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all OTWatch operations.
#[derive(Debug, thiserror::Error)]
pub enum OtWatchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Feed request failed after exhausting the retry budget.
    #[error("feed unavailable: {0}")]
    FeedUnavailable(String),

    /// Feed signalled throttling and the retry budget is exhausted.
    #[error("feed rate limited after {attempts} attempts")]
    FeedRateLimited { attempts: u32 },

    /// Model backend failure while classifying a record.
    #[error("classification unavailable for {cve_id}: {reason}")]
    ClassificationUnavailable { cve_id: String, reason: String },

    /// Model backend failure while synthesizing an impact statement.
    #[error("synthesis unavailable for {cve_id}: {reason}")]
    SynthesisUnavailable { cve_id: String, reason: String },

    /// Dedup cache file exists but cannot be read or parsed. Fatal.
    #[error("dedup cache corrupt at {path:?}: {message}")]
    CacheCorrupt { path: PathBuf, message: String },

    /// Report could not be written to disk.
    #[error("report write failed at {path:?}: {source}")]
    ReportWriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Raw model backend error (wrapped into the stage-specific variants by
    /// the classifier and synthesizer).
    #[error("model backend error: {0}")]
    ModelBackend(String),

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OtWatchError>;

impl OtWatchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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

    /// Whether this error must stop the process instead of the cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CacheCorrupt { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = OtWatchError::config("missing feed base URL");
        assert_eq!(err.to_string(), "config error: missing feed base URL");

        let err = OtWatchError::FeedRateLimited { attempts: 3 };
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn only_cache_corruption_is_fatal() {
        assert!(
            OtWatchError::CacheCorrupt {
                path: "data/cve_cache.json".into(),
                message: "truncated".into(),
            }
            .is_fatal()
        );
        assert!(!OtWatchError::FeedUnavailable("timeout".into()).is_fatal());
        assert!(
            !OtWatchError::ClassificationUnavailable {
                cve_id: "CVE-2026-0001".into(),
                reason: "connection refused".into(),
            }
            .is_fatal()
        );
    }
}
