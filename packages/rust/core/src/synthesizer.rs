//! Operational-impact synthesis for relevant records.
//!
//! One prompt per relevant record asking for a short (2-3 sentence)
//! explanation of the operational risk. The free-text response is trimmed and
//! length-capped, nothing more. A response too short to be useful is replaced
//! by a severity-tiered generic statement.

use std::sync::Arc;

use tracing::warn;

use otwatch_shared::{CveRecord, OtWatchError, Result, Severity};

use crate::model::TextGenerator;

/// Responses shorter than this are replaced by the generic statement.
const MIN_IMPACT_CHARS: usize = 50;

/// Impact statement generator.
pub struct ImpactSynthesizer {
    generator: Arc<dyn TextGenerator>,
    max_chars: usize,
}

impl ImpactSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, max_chars: usize) -> Self {
        Self {
            generator,
            max_chars,
        }
    }

    /// Synthesize an impact statement for a relevant record.
    ///
    /// Backend failures surface as `SynthesisUnavailable`; the caller keeps
    /// the record in the report regardless.
    pub async fn synthesize(&self, record: &CveRecord) -> Result<String> {
        let prompt = impact_prompt(record);
        let response = self.generator.generate(&prompt).await.map_err(|e| {
            OtWatchError::SynthesisUnavailable {
                cve_id: record.cve_id.clone(),
                reason: e.to_string(),
            }
        })?;

        let impact = response.trim();
        if impact.chars().count() < MIN_IMPACT_CHARS {
            warn!(
                cve_id = %record.cve_id,
                chars = impact.chars().count(),
                "impact response too short, using generic statement"
            );
            return Ok(generic_impact(record.cvss_score));
        }

        Ok(cap_chars(impact, self.max_chars))
    }
}

/// Severity-tiered generic impact statement, used when the model produces
/// nothing usable.
pub fn generic_impact(cvss_score: f64) -> String {
    if cvss_score >= 9.0 {
        "This critical vulnerability could allow attackers to gain complete control of \
         industrial systems, potentially causing severe operational disruption, safety \
         incidents, or equipment damage. Immediate remediation is essential to protect \
         critical infrastructure."
            .into()
    } else if cvss_score >= 7.0 {
        "This high-severity vulnerability poses significant risk to industrial operations. \
         Exploitation could result in unauthorized access to control systems, process \
         manipulation, or service disruption affecting production and safety."
            .into()
    } else {
        "This vulnerability affects industrial control systems and should be addressed \
         through proper patch management and security controls to maintain operational \
         integrity."
            .into()
    }
}

fn impact_prompt(record: &CveRecord) -> String {
    let severity = Severity::from_score(record.cvss_score);
    format!(
        "You are an OT cybersecurity analyst. Provide a concise 2-3 sentence explanation \
of why this vulnerability is dangerous for industrial facilities like factories, power \
plants, or manufacturing sites.\n\
\n\
Focus on real-world operational risks such as:\n\
- Production shutdowns or equipment damage\n\
- Safety hazards to workers\n\
- Loss of process control or monitoring\n\
- Environmental or regulatory impacts\n\
- Financial losses from downtime\n\
\n\
CVE ID: {id}\n\
Severity: {severity} severity (CVSS {score})\n\
Description: {description}\n\
\n\
Industrial Impact Analysis (2-3 sentences):",
        id = record.cve_id,
        severity = severity,
        score = record.cvss_score,
        description = record.description,
    )
}

/// Char-boundary-safe cap.
fn cap_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::ScriptedGenerator;

    fn record(score: f64) -> CveRecord {
        CveRecord {
            cve_id: "CVE-2026-0001".into(),
            cvss_score: score,
            cvss_vector: "CVSS:3.1/AV:N".into(),
            description: "Authentication bypass in a SCADA HMI panel.".into(),
            published_date: "2026-01-26T08:15:00.000".into(),
            last_modified: "2026-01-26T08:15:00.000".into(),
            references: vec![],
        }
    }

    const GOOD_IMPACT: &str = "Attackers could take over operator screens and issue \
arbitrary setpoint changes, halting production and endangering on-site personnel. \
Recovery would require taking the affected line offline.";

    #[tokio::test]
    async fn passes_through_a_usable_response() {
        let generator = Arc::new(ScriptedGenerator::new([Ok(GOOD_IMPACT)]));
        let synthesizer = ImpactSynthesizer::new(generator.clone(), 800);

        let impact = synthesizer.synthesize(&record(9.8)).await.unwrap();
        assert_eq!(impact, GOOD_IMPACT);

        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("CVE-2026-0001"));
        assert!(prompt.contains("CRITICAL severity (CVSS 9.8)"));
        assert!(prompt.contains("SCADA HMI panel"));
    }

    #[tokio::test]
    async fn short_response_falls_back_to_generic_statement() {
        let generator = Arc::new(ScriptedGenerator::new([Ok("Bad.")]));
        let synthesizer = ImpactSynthesizer::new(generator, 800);

        let impact = synthesizer.synthesize(&record(9.8)).await.unwrap();
        assert_eq!(impact, generic_impact(9.8));
        assert!(impact.contains("critical"));
    }

    #[tokio::test]
    async fn long_response_is_capped() {
        // Long enough to clear the minimum, longer than the cap.
        let generator = Arc::new(ScriptedGenerator::new([Ok(GOOD_IMPACT)]));
        let synthesizer = ImpactSynthesizer::new(generator, 60);

        let impact = synthesizer.synthesize(&record(7.5)).await.unwrap();
        assert_eq!(impact.chars().count(), 60);
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_synthesis_unavailable() {
        let generator = Arc::new(ScriptedGenerator::new([Err("model timeout")]));
        let synthesizer = ImpactSynthesizer::new(generator, 800);

        let err = synthesizer.synthesize(&record(5.0)).await.unwrap_err();
        assert!(matches!(err, OtWatchError::SynthesisUnavailable { .. }));
    }

    #[test]
    fn generic_impact_tiers_by_score() {
        assert!(generic_impact(9.8).contains("critical"));
        assert!(generic_impact(7.5).contains("high-severity"));
        assert!(generic_impact(3.0).contains("patch management"));
    }
}
