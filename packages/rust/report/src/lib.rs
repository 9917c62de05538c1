//! Versioned threat report: builder, persistence, and summary rendering.
//!
//! [`build_report`] is a pure function — given the same classified records and
//! timestamp it always produces the same report. The JSON shape written by
//! [`save_report`] is an external contract consumed by the dashboard.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use otwatch_shared::{ClassifiedCve, OtWatchError, REPORT_VERSION, Result, Severity};

// ---------------------------------------------------------------------------
// Report structures (external JSON contract)
// ---------------------------------------------------------------------------

/// One relevant threat in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatEntry {
    pub cve_id: String,
    pub cvss_score: f64,
    pub severity: Severity,
    pub description: String,
    /// Generated operational-impact statement; empty when synthesis failed.
    pub ai_insight: String,
    pub published_date: String,
    pub last_modified: String,
    pub references: Vec<String>,
}

/// Counts for the four named severity buckets. NONE-severity threats appear
/// in the threat list but in no bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// The full report document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatReport {
    pub generated_at: String,
    pub report_version: String,
    pub total_threats: usize,
    pub severity_breakdown: SeverityBreakdown,
    pub threats: Vec<ThreatEntry>,
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Build a report from classified records.
///
/// Only relevant records are included, ordered by CVSS score descending with
/// identifier ascending as the tie-breaker so output is deterministic.
pub fn build_report(classified: &[ClassifiedCve], generated_at: DateTime<Utc>) -> ThreatReport {
    let mut threats: Vec<ThreatEntry> = classified
        .iter()
        .filter(|c| c.relevant)
        .map(|c| ThreatEntry {
            cve_id: c.record.cve_id.clone(),
            cvss_score: c.record.cvss_score,
            severity: Severity::from_score(c.record.cvss_score),
            description: c.record.description.clone(),
            ai_insight: c.impact.clone().unwrap_or_default(),
            published_date: c.record.published_date.clone(),
            last_modified: c.record.last_modified.clone(),
            references: c.record.references.clone(),
        })
        .collect();

    threats.sort_by(|a, b| {
        b.cvss_score
            .partial_cmp(&a.cvss_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.cve_id.cmp(&b.cve_id))
    });

    let mut breakdown = SeverityBreakdown::default();
    for threat in &threats {
        match threat.severity {
            Severity::Critical => breakdown.critical += 1,
            Severity::High => breakdown.high += 1,
            Severity::Medium => breakdown.medium += 1,
            Severity::Low => breakdown.low += 1,
            Severity::None => {}
        }
    }

    ThreatReport {
        generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        report_version: REPORT_VERSION.into(),
        total_threats: threats.len(),
        severity_breakdown: breakdown,
        threats,
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Write the report as pretty JSON. Returns the path written.
pub fn save_report(report: &ThreatReport, path: &Path) -> Result<PathBuf> {
    let write_err = |source: std::io::Error| OtWatchError::ReportWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(&write_err)?;
        }
    }

    let content =
        serde_json::to_string_pretty(report).map_err(|e| write_err(std::io::Error::other(e)))?;
    std::fs::write(path, content).map_err(&write_err)?;

    info!(
        total_threats = report.total_threats,
        critical = report.severity_breakdown.critical,
        high = report.severity_breakdown.high,
        ?path,
        "report saved"
    );
    Ok(path.to_path_buf())
}

/// Load a previously saved report.
pub fn load_report(path: &Path) -> Result<ThreatReport> {
    let content = std::fs::read_to_string(path).map_err(|e| OtWatchError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        OtWatchError::validation(format!("invalid report at {}: {e}", path.display()))
    })
}

// ---------------------------------------------------------------------------
// Summary rendering
// ---------------------------------------------------------------------------

/// Render a human-readable summary for terminal display.
pub fn render_summary(report: &ThreatReport) -> String {
    let rule = "=".repeat(70);
    let mut out = Vec::new();

    out.push(rule.clone());
    out.push("OT THREAT INTELLIGENCE REPORT".into());
    out.push(rule.clone());
    out.push(format!("Generated: {}", report.generated_at));
    out.push(format!("Total Threats: {}", report.total_threats));

    out.push(String::new());
    out.push("SEVERITY BREAKDOWN:".into());
    out.push(format!("  Critical: {}", report.severity_breakdown.critical));
    out.push(format!("  High:     {}", report.severity_breakdown.high));
    out.push(format!("  Medium:   {}", report.severity_breakdown.medium));
    out.push(format!("  Low:      {}", report.severity_breakdown.low));

    out.push(String::new());
    out.push(rule.clone());
    out.push("THREAT DETAILS".into());
    out.push(rule.clone());

    for (idx, threat) in report.threats.iter().enumerate() {
        out.push(String::new());
        out.push(format!(
            "[{}] {} - {}",
            idx + 1,
            threat.cve_id,
            threat.severity
        ));
        out.push(format!("    CVSS Score: {}", threat.cvss_score));
        out.push(format!("    Published: {}", truncate(&threat.published_date, 10)));
        out.push(format!("    Description: {}", truncate(&threat.description, 150)));
        out.push(format!("    Impact: {}", truncate(&threat.ai_insight, 200)));
    }

    out.push(String::new());
    out.push(rule);
    out.join("\n")
}

/// Char-boundary-safe truncation with an ellipsis.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use otwatch_shared::CveRecord;

    fn record(id: &str, score: f64) -> CveRecord {
        CveRecord {
            cve_id: id.into(),
            cvss_score: score,
            cvss_vector: "CVSS:3.1/AV:N".into(),
            description: format!("Vulnerability {id} in a PLC runtime."),
            published_date: "2026-01-26T08:15:00.000".into(),
            last_modified: "2026-01-26T08:15:00.000".into(),
            references: vec![format!("https://example.com/{id}")],
        }
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 26, 12, 0, 0).unwrap()
    }

    #[test]
    fn orders_by_score_descending() {
        let classified = vec![
            ClassifiedCve::relevant(record("CVE-2026-0001", 5.0), "a".into()),
            ClassifiedCve::relevant(record("CVE-2026-0002", 9.8), "b".into()),
            ClassifiedCve::relevant(record("CVE-2026-0003", 7.5), "c".into()),
        ];

        let report = build_report(&classified, generated_at());
        let scores: Vec<f64> = report.threats.iter().map(|t| t.cvss_score).collect();
        assert_eq!(scores, vec![9.8, 7.5, 5.0]);
    }

    #[test]
    fn equal_scores_break_ties_by_identifier() {
        let classified = vec![
            ClassifiedCve::relevant(record("CVE-2026-0300", 7.5), "x".into()),
            ClassifiedCve::relevant(record("CVE-2026-0100", 7.5), "y".into()),
            ClassifiedCve::relevant(record("CVE-2026-0200", 7.5), "z".into()),
        ];

        let report = build_report(&classified, generated_at());
        let ids: Vec<&str> = report.threats.iter().map(|t| t.cve_id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2026-0100", "CVE-2026-0200", "CVE-2026-0300"]);
    }

    #[test]
    fn irrelevant_records_are_excluded() {
        let classified = vec![
            ClassifiedCve::relevant(record("CVE-2026-0001", 9.8), "impact".into()),
            ClassifiedCve::irrelevant(record("CVE-2026-0002", 9.9)),
        ];

        let report = build_report(&classified, generated_at());
        assert_eq!(report.total_threats, 1);
        assert_eq!(report.threats[0].cve_id, "CVE-2026-0001");
    }

    #[test]
    fn breakdown_counts_four_buckets_only() {
        let classified = vec![
            ClassifiedCve::relevant(record("CVE-2026-0001", 9.8), String::new()),
            ClassifiedCve::relevant(record("CVE-2026-0002", 7.0), String::new()),
            ClassifiedCve::relevant(record("CVE-2026-0003", 4.0), String::new()),
            ClassifiedCve::relevant(record("CVE-2026-0004", 0.5), String::new()),
            ClassifiedCve::relevant(record("CVE-2026-0005", 0.0), String::new()),
        ];

        let report = build_report(&classified, generated_at());
        assert_eq!(report.total_threats, 5, "NONE severity stays in the list");
        assert_eq!(report.severity_breakdown.critical, 1);
        assert_eq!(report.severity_breakdown.high, 1);
        assert_eq!(report.severity_breakdown.medium, 1);
        assert_eq!(report.severity_breakdown.low, 1);
    }

    #[test]
    fn empty_relevant_set_yields_valid_report() {
        let report = build_report(&[], generated_at());
        assert_eq!(report.total_threats, 0);
        assert_eq!(report.severity_breakdown, SeverityBreakdown::default());
        assert!(report.threats.is_empty());
        assert_eq!(report.report_version, "1.0");
    }

    #[test]
    fn serialized_shape_matches_contract() {
        let classified = vec![ClassifiedCve::relevant(
            record("CVE-2026-0001", 9.8),
            "Attackers could halt the production line.".into(),
        )];
        let report = build_report(&classified, generated_at());

        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&report).unwrap()).unwrap();
        assert_eq!(value["report_version"], "1.0");
        assert_eq!(value["generated_at"], "2026-01-26T12:00:00Z");
        assert_eq!(value["total_threats"], 1);
        assert_eq!(value["severity_breakdown"]["critical"], 1);

        let threat = &value["threats"][0];
        assert_eq!(threat["cve_id"], "CVE-2026-0001");
        assert_eq!(threat["cvss_score"], 9.8);
        assert_eq!(threat["severity"], "CRITICAL");
        assert!(threat["ai_insight"].as_str().unwrap().contains("production"));
        assert!(threat["references"].is_array());
    }

    #[test]
    fn report_roundtrip_through_file() {
        let classified = vec![
            ClassifiedCve::relevant(record("CVE-2026-0001", 9.8), "impact one".into()),
            ClassifiedCve::relevant(record("CVE-2026-0002", 6.3), String::new()),
        ];
        let report = build_report(&classified, generated_at());

        let dir = std::env::temp_dir().join(format!(
            "otwatch-report-test-{}",
            std::process::id()
        ));
        let path = dir.join("report.json");

        save_report(&report, &path).expect("save");
        let loaded = load_report(&path).expect("load");
        assert_eq!(loaded, report);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn summary_lists_threats_in_order() {
        let classified = vec![
            ClassifiedCve::relevant(record("CVE-2026-0002", 5.0), "low impact".into()),
            ClassifiedCve::relevant(record("CVE-2026-0001", 9.8), "high impact".into()),
        ];
        let report = build_report(&classified, generated_at());
        let summary = render_summary(&report);

        assert!(summary.contains("OT THREAT INTELLIGENCE REPORT"));
        assert!(summary.contains("Total Threats: 2"));
        let first = summary.find("CVE-2026-0001").expect("critical listed");
        let second = summary.find("CVE-2026-0002").expect("low listed");
        assert!(first < second, "critical threat renders first");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        // Multibyte input must not panic.
        assert_eq!(truncate("тест-кейс", 4), "тест...");
    }
}
