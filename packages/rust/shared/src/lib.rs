//! Shared types, error model, and configuration for OTWatch.
//!
//! This crate is the foundation depended on by all other OTWatch crates.
//! It provides:
//! - [`OtWatchError`] — the unified error type
//! - Domain types ([`CveRecord`], [`ClassifiedCve`], [`Severity`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClassifierConfig, FeedConfig, ModelConfig, MonitorConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{OtWatchError, Result};
pub use types::{ClassifiedCve, CveRecord, REPORT_VERSION, Severity};
