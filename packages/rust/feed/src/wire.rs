//! Feed wire format: serde mappings for NVD 2.0 JSON pages.

use serde::Deserialize;
use tracing::warn;

use otwatch_shared::CveRecord;

/// Cap on reference URLs carried per record.
const MAX_REFERENCES: usize = 3;

/// Fallback description when the feed carried no English text.
const NO_DESCRIPTION: &str = "No description available";

/// One page of a paginated window query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FeedPage {
    #[serde(default)]
    pub results_per_page: u32,
    #[serde(default)]
    pub start_index: u32,
    #[serde(default)]
    pub total_results: u32,
    /// Kept as raw values so one malformed entry cannot poison the page.
    #[serde(default)]
    pub vulnerabilities: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    cve: CveEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CveEntry {
    id: Option<String>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    descriptions: Vec<LangString>,
    #[serde(default)]
    metrics: Metrics,
    #[serde(default)]
    references: Vec<Reference>,
}

#[derive(Debug, Deserialize)]
struct LangString {
    #[serde(default)]
    lang: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metrics {
    #[serde(default)]
    cvss_metric_v31: Vec<CvssMetric>,
    #[serde(default)]
    cvss_metric_v30: Vec<CvssMetric>,
    #[serde(default)]
    cvss_metric_v2: Vec<CvssMetric>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssMetric {
    #[serde(default)]
    cvss_data: CvssData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssData {
    #[serde(default)]
    base_score: f64,
    #[serde(default)]
    vector_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Reference {
    #[serde(default)]
    url: String,
}

/// Map one raw feed entry to a [`CveRecord`].
///
/// Malformed entries (undecodable shape, missing identifier) are skipped with
/// a warning rather than failing the page.
pub(crate) fn parse_entry(raw: &serde_json::Value) -> Option<CveRecord> {
    let entry: FeedEntry = match serde_json::from_value(raw.clone()) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(error = %e, "skipping malformed feed entry");
            return None;
        }
    };

    let cve = entry.cve;
    let Some(cve_id) = cve.id.filter(|id| !id.is_empty()) else {
        warn!("skipping feed entry without an identifier");
        return None;
    };

    // Metric preference: CVSS v3.1, then v3.0, then v2.
    let metric = cve
        .metrics
        .cvss_metric_v31
        .first()
        .or_else(|| cve.metrics.cvss_metric_v30.first())
        .or_else(|| cve.metrics.cvss_metric_v2.first());

    let (cvss_score, cvss_vector) = match metric {
        Some(m) => (
            m.cvss_data.base_score,
            m.cvss_data.vector_string.clone().unwrap_or_else(|| "N/A".into()),
        ),
        None => (0.0, "N/A".into()),
    };

    let description = cve
        .descriptions
        .iter()
        .find(|d| d.lang == "en")
        .map(|d| d.value.clone())
        .unwrap_or_else(|| NO_DESCRIPTION.into());

    let references = cve
        .references
        .iter()
        .filter(|r| !r.url.is_empty())
        .take(MAX_REFERENCES)
        .map(|r| r.url.clone())
        .collect();

    Some(CveRecord {
        cve_id,
        cvss_score,
        cvss_vector,
        description,
        published_date: cve.published.unwrap_or_else(|| "Unknown".into()),
        last_modified: cve.last_modified.unwrap_or_else(|| "Unknown".into()),
        references,
    })
}
