//! Core domain types for OTWatch threat monitoring.

use serde::{Deserialize, Serialize};

/// Report format version written into every generated report.
pub const REPORT_VERSION: &str = "1.0";

// ---------------------------------------------------------------------------
// CveRecord
// ---------------------------------------------------------------------------

/// One vulnerability record as ingested from the feed.
///
/// Immutable once fetched. Timestamps are carried as the opaque strings the
/// feed supplied; only the fetch window itself is computed with real
/// datetimes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveRecord {
    /// Feed-unique identifier (e.g. `CVE-2026-12345`).
    pub cve_id: String,
    /// CVSS base score, 0.0–10.0. Zero when the feed carried no metric.
    pub cvss_score: f64,
    /// CVSS vector string, opaque (e.g. `CVSS:3.1/AV:N/...`).
    pub cvss_vector: String,
    /// English description text.
    pub description: String,
    /// Publication timestamp as supplied by the feed.
    pub published_date: String,
    /// Last-modified timestamp as supplied by the feed.
    pub last_modified: String,
    /// Reference URLs.
    pub references: Vec<String>,
}

// ---------------------------------------------------------------------------
// ClassifiedCve
// ---------------------------------------------------------------------------

/// A record annotated with its relevance verdict and, when relevant, the
/// generated impact statement.
///
/// `impact` is `Some` iff `relevant` is true; it holds an empty string when
/// synthesis failed for an otherwise relevant record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedCve {
    pub record: CveRecord,
    pub relevant: bool,
    pub impact: Option<String>,
}

impl ClassifiedCve {
    /// An irrelevant record, carrying no impact statement.
    pub fn irrelevant(record: CveRecord) -> Self {
        Self {
            record,
            relevant: false,
            impact: None,
        }
    }

    /// A relevant record with its impact statement.
    pub fn relevant(record: CveRecord, impact: String) -> Self {
        Self {
            record,
            relevant: true,
            impact: Some(impact),
        }
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity bucket derived from the CVSS base score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    None,
}

impl Severity {
    /// Bucket assignment: `[9.0,10.0]` CRITICAL, `[7.0,9.0)` HIGH,
    /// `[4.0,7.0)` MEDIUM, `(0.0,4.0)` LOW, `0.0` NONE.
    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            Self::Critical
        } else if score >= 7.0 {
            Self::High
        } else if score >= 4.0 {
            Self::Medium
        } else if score > 0.0 {
            Self::Low
        } else {
            Self::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::None => "NONE",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
