//! Core pipeline logic for OTWatch.
//!
//! This crate ties the feed client, dedup cache, two-stage relevance
//! classifier, impact synthesizer, and report builder into the cycle
//! orchestrator (`run`/`watch` workflows).

pub mod classifier;
pub mod model;
pub mod pipeline;
pub mod synthesizer;
