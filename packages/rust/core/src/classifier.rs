//! Two-stage relevance classifier.
//!
//! Stage 1 is a case-insensitive keyword pre-filter over the record
//! description: no keyword match, no model call. Stage 2 asks the model for a
//! binary decision restricted to the tokens `relevant` / `not-relevant`.
//! Anything the model says outside that vocabulary counts as not-relevant —
//! the pipeline never blocks on ambiguous output.

use std::sync::Arc;

use tracing::{debug, warn};

use otwatch_shared::{CveRecord, OtWatchError, Result};

use crate::model::TextGenerator;

/// Accepted affirmative token.
const RELEVANT_TOKEN: &str = "relevant";
/// Accepted negative token.
const NOT_RELEVANT_TOKEN: &str = "not-relevant";

// ---------------------------------------------------------------------------
// KeywordSet
// ---------------------------------------------------------------------------

/// Case-insensitive substring matcher over a configured keyword list.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    /// Stored lower-cased; matching lower-cases the haystack once.
    keywords: Vec<String>,
}

impl KeywordSet {
    pub fn new(keywords: impl IntoIterator<Item = String>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .filter(|k| !k.is_empty())
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    /// First keyword contained in `text`, if any.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| haystack.contains(k.as_str()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RelevanceClassifier
// ---------------------------------------------------------------------------

/// Keyword pre-filter plus model confirmation.
pub struct RelevanceClassifier {
    generator: Arc<dyn TextGenerator>,
    keywords: KeywordSet,
}

impl RelevanceClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>, keywords: KeywordSet) -> Self {
        Self {
            generator,
            keywords,
        }
    }

    /// Classify one record. Model backend failures surface as
    /// `ClassificationUnavailable` for that record; they never panic and never
    /// silently pass.
    pub async fn classify(&self, record: &CveRecord) -> Result<bool> {
        // Stage 1: the model is never invoked when no keyword matches.
        let Some(keyword) = self.keywords.first_match(&record.description) else {
            debug!(cve_id = %record.cve_id, "no keyword match, skipping model check");
            return Ok(false);
        };
        debug!(cve_id = %record.cve_id, keyword, "keyword match, confirming with model");

        // Stage 2: binary confirmation.
        let prompt = classification_prompt(&record.description);
        let response = self.generator.generate(&prompt).await.map_err(|e| {
            OtWatchError::ClassificationUnavailable {
                cve_id: record.cve_id.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(parse_verdict(&response, &record.cve_id))
    }
}

/// Normalize the model response and map it onto the accepted vocabulary.
/// Anything else is treated as not-relevant with a logged warning.
fn parse_verdict(response: &str, cve_id: &str) -> bool {
    let normalized = response.trim().to_lowercase();
    match normalized.as_str() {
        RELEVANT_TOKEN => true,
        NOT_RELEVANT_TOKEN => false,
        _ => {
            warn!(
                cve_id,
                response = %response.trim(),
                "unrecognized model verdict, treating as not-relevant"
            );
            false
        }
    }
}

fn classification_prompt(description: &str) -> String {
    format!(
        "You are a cybersecurity expert specializing in Operational Technology (OT) \
and Industrial Control Systems (ICS).\n\
\n\
Analyze the following CVE description and determine whether it affects OT/ICS \
environments such as factories, power plants, water treatment facilities, or \
critical infrastructure.\n\
\n\
OT/ICS indicators include:\n\
- Industrial control systems: SCADA, PLC, HMI, DCS, RTU\n\
- Industrial vendors: Siemens, Rockwell Automation, Schneider Electric, Allen-Bradley, ABB, Honeywell\n\
- Industrial protocols: Modbus, DNP3, OPC, Profinet, EtherNet/IP, BACnet\n\
- Industrial software: FactoryTalk, TIA Portal, Unity Pro, WinCC\n\
\n\
CVE description:\n\
{description}\n\
\n\
Answer with exactly one token: 'relevant' if this CVE directly affects OT/ICS \
systems, or 'not-relevant' if it only affects standard IT systems (like web \
browsers, office software, general operating systems).\n\
\n\
Answer:"
    )
}
