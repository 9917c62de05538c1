//! Windowed, throttled NVD feed client.
//!
//! [`FeedClient`] issues paginated queries for a publication-time window,
//! enforces the feed's inter-request delay (larger without a credential),
//! retries transient failures with a bounded budget, and drops records whose
//! identifier is already in the dedup cache.

mod client;
mod wire;

pub use client::FeedClient;
