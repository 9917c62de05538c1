//! Paginated, throttled window queries against the vulnerability feed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use otwatch_cache::DedupCache;
use otwatch_shared::{CveRecord, FeedConfig, OtWatchError, Result};

use crate::wire::{self, FeedPage};

/// User-Agent string for feed requests.
const USER_AGENT: &str = concat!("OTWatch/", env!("CARGO_PKG_VERSION"));

/// Timestamp format accepted by the feed's window parameters.
const WINDOW_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Outcome of a single page request, before retry accounting.
enum PageFailure {
    /// Server signalled throttling (HTTP 429/503).
    RateLimited(String),
    /// Network failure, unexpected status, or undecodable payload.
    Unavailable(String),
}

/// Windowed feed client.
pub struct FeedClient {
    config: FeedConfig,
    base: Url,
    client: Client,
    api_key: Option<String>,
}

impl FeedClient {
    /// Create a client, resolving the credential from the configured env var.
    pub fn new(config: FeedConfig) -> Result<Self> {
        let api_key = config.api_key();
        Self::with_api_key(config, api_key)
    }

    /// Create a client with an explicit credential (tests, overrides).
    pub fn with_api_key(config: FeedConfig, api_key: Option<String>) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| OtWatchError::config(format!("invalid feed base_url: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OtWatchError::FeedUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            base,
            client,
            api_key,
        })
    }

    /// Whether a feed credential is configured.
    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetch all records published in `[window_start, window_end)` that are
    /// not already in the dedup cache, in feed order.
    ///
    /// Cached identifiers are dropped silently; they do not count as new.
    /// Malformed entries are skipped with a warning. An empty window yields
    /// an empty list without touching the network.
    #[instrument(skip_all, fields(start = %window_start, end = %window_end))]
    pub async fn fetch_window(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        cache: &dyn DedupCache,
    ) -> Result<Vec<CveRecord>> {
        if window_start >= window_end {
            debug!("empty fetch window");
            return Ok(Vec::new());
        }

        let pub_start = window_start.format(WINDOW_TS_FORMAT).to_string();
        let pub_end = window_end.format(WINDOW_TS_FORMAT).to_string();
        let delay_ms = self
            .config
            .inter_request_delay_ms(self.api_key.is_some());

        let mut records = Vec::new();
        let mut dropped = 0usize;
        let mut start_index = 0u32;
        let mut first_request = true;

        loop {
            if !first_request && delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            first_request = false;

            let page = self.fetch_page(&pub_start, &pub_end, start_index).await?;

            for raw in &page.vulnerabilities {
                let Some(record) = wire::parse_entry(raw) else {
                    continue;
                };
                if cache.contains(&record.cve_id) {
                    dropped += 1;
                    continue;
                }
                debug!(cve_id = %record.cve_id, score = record.cvss_score, "new record");
                records.push(record);
            }

            let fetched = page.start_index + page.results_per_page;
            if page.results_per_page == 0 || fetched >= page.total_results {
                break;
            }
            start_index = fetched;
        }

        info!(
            new = records.len(),
            already_seen = dropped,
            "window fetch complete"
        );
        Ok(records)
    }

    /// Fetch one page, retrying up to the configured budget with a fixed
    /// delay. A throttle signal that survives the budget becomes
    /// `FeedRateLimited`; anything else becomes `FeedUnavailable`.
    async fn fetch_page(
        &self,
        pub_start: &str,
        pub_end: &str,
        start_index: u32,
    ) -> Result<FeedPage> {
        let attempts = self.config.retry_attempts.max(1);
        let mut last_failure = None;

        for attempt in 1..=attempts {
            match self.request_page(pub_start, pub_end, start_index).await {
                Ok(page) => return Ok(page),
                Err(failure) => {
                    let detail = match &failure {
                        PageFailure::RateLimited(msg) => msg,
                        PageFailure::Unavailable(msg) => msg,
                    };
                    warn!(attempt, attempts, start_index, error = %detail, "feed request failed");
                    last_failure = Some(failure);
                }
            }

            if attempt < attempts && self.config.retry_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
        }

        match last_failure {
            Some(PageFailure::RateLimited(_)) => Err(OtWatchError::FeedRateLimited { attempts }),
            Some(PageFailure::Unavailable(msg)) => Err(OtWatchError::FeedUnavailable(msg)),
            None => unreachable!("retry loop runs at least once"),
        }
    }

    /// One raw page request, classified into throttle vs. other failures.
    async fn request_page(
        &self,
        pub_start: &str,
        pub_end: &str,
        start_index: u32,
    ) -> std::result::Result<FeedPage, PageFailure> {
        let results_per_page = self.config.results_per_page.to_string();
        let start_index = start_index.to_string();
        let mut request = self.client.get(self.base.clone()).query(&[
            ("pubStartDate", pub_start),
            ("pubEndDate", pub_end),
            ("resultsPerPage", results_per_page.as_str()),
            ("startIndex", start_index.as_str()),
        ]);

        if let Some(key) = &self.api_key {
            request = request.header("apiKey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PageFailure::Unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(PageFailure::RateLimited(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(PageFailure::Unavailable(format!("HTTP {status}")));
        }

        response
            .json::<FeedPage>()
            .await
            .map_err(|e| PageFailure::Unavailable(format!("invalid feed payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use otwatch_cache::MemoryDedupCache;
    use serde_json::json;
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> FeedConfig {
        FeedConfig {
            base_url,
            results_per_page: 2000,
            request_delay_ms: 0,
            keyed_request_delay_ms: 0,
            retry_attempts: 2,
            retry_delay_ms: 0,
            ..FeedConfig::default()
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2026, 1, 26, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 26, 8, 10, 0).unwrap(),
        )
    }

    fn entry(id: &str, score: f64) -> serde_json::Value {
        json!({
            "cve": {
                "id": id,
                "published": "2026-01-26T08:05:00.000",
                "lastModified": "2026-01-26T08:05:00.000",
                "descriptions": [{"lang": "en", "value": "Flaw in a SCADA historian."}],
                "metrics": {
                    "cvssMetricV31": [{"cvssData": {"baseScore": score, "vectorString": "CVSS:3.1/AV:N"}}]
                },
                "references": []
            }
        })
    }

    fn page(total: u32, start: u32, entries: Vec<serde_json::Value>) -> serde_json::Value {
        json!({
            "resultsPerPage": entries.len(),
            "startIndex": start,
            "totalResults": total,
            "vulnerabilities": entries
        })
    }

    #[tokio::test]
    async fn paginated_window_fetch_preserves_feed_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("startIndex", "0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page(2, 0, vec![entry("CVE-2026-0001", 9.8)])),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(query_param("startIndex", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page(2, 1, vec![entry("CVE-2026-0002", 5.0)])),
            )
            .mount(&server)
            .await;

        let client = FeedClient::with_api_key(test_config(server.uri()), None).unwrap();
        let cache = MemoryDedupCache::new();
        let (start, end) = window();

        let records = client.fetch_window(start, end, &cache).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.cve_id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2026-0001", "CVE-2026-0002"]);
    }

    #[tokio::test]
    async fn cached_identifiers_are_dropped_silently() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                2,
                0,
                vec![entry("CVE-2026-0001", 9.8), entry("CVE-2026-0002", 5.0)],
            )))
            .mount(&server)
            .await;

        let client = FeedClient::with_api_key(test_config(server.uri()), None).unwrap();
        let cache = MemoryDedupCache::with_ids(["CVE-2026-0001"]);
        let (start, end) = window();

        let records = client.fetch_window(start, end, &cache).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cve_id, "CVE-2026-0002");
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                3,
                0,
                vec![entry("CVE-2026-0001", 7.5), json!({"cve": 42}), json!({})],
            )))
            .mount(&server)
            .await;

        let client = FeedClient::with_api_key(test_config(server.uri()), None).unwrap();
        let cache = MemoryDedupCache::new();
        let (start, end) = window();

        let records = client.fetch_window(start, end, &cache).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cve_id, "CVE-2026-0001");
    }

    #[tokio::test]
    async fn throttling_surfaces_as_rate_limited_after_retries() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;

        let client = FeedClient::with_api_key(test_config(server.uri()), None).unwrap();
        let cache = MemoryDedupCache::new();
        let (start, end) = window();

        let err = client.fetch_window(start, end, &cache).await.unwrap_err();
        assert!(matches!(err, OtWatchError::FeedRateLimited { attempts: 2 }));
    }

    #[tokio::test]
    async fn server_errors_surface_as_unavailable_after_retries() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let client = FeedClient::with_api_key(test_config(server.uri()), None).unwrap();
        let cache = MemoryDedupCache::new();
        let (start, end) = window();

        let err = client.fetch_window(start, end, &cache).await.unwrap_err();
        assert!(matches!(err, OtWatchError::FeedUnavailable(_)));
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page(1, 0, vec![entry("CVE-2026-0001", 6.1)])),
            )
            .mount(&server)
            .await;

        let client = FeedClient::with_api_key(test_config(server.uri()), None).unwrap();
        let cache = MemoryDedupCache::new();
        let (start, end) = window();

        let records = client.fetch_window(start, end, &cache).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn credential_is_sent_as_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(header("apiKey", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(0, 0, vec![])))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            FeedClient::with_api_key(test_config(server.uri()), Some("test-key".into())).unwrap();
        assert!(client.has_credential());

        let cache = MemoryDedupCache::new();
        let (start, end) = window();
        let records = client.fetch_window(start, end, &cache).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn empty_window_skips_the_network() {
        // No mock server at all: the request would fail if issued.
        let client = FeedClient::with_api_key(
            test_config("http://127.0.0.1:9".into()),
            None,
        )
        .unwrap();
        let cache = MemoryDedupCache::new();
        let start = Utc.with_ymd_and_hms(2026, 1, 26, 8, 0, 0).unwrap();

        let records = client.fetch_window(start, start, &cache).await.unwrap();
        assert!(records.is_empty());
    }
}
