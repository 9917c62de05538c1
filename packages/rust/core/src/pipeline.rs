//! Cycle orchestration: fetch → classify → synthesize → report.
//!
//! One cycle walks the phase machine
//! `Idle → Fetching → Classifying → Synthesizing → Reporting → Idle`
//! (`Failed` on a cycle-level error). Records are processed strictly
//! sequentially: the feed is throttled and the model backend is a single
//! shared resource. Per-record classification/synthesis failures are caught
//! at the record level and never abort the cycle for the rest.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use otwatch_cache::DedupCache;
use otwatch_feed::FeedClient;
use otwatch_report::SeverityBreakdown;
use otwatch_shared::{ClassifiedCve, CveRecord, Result};

use crate::classifier::RelevanceClassifier;
use crate::synthesizer::ImpactSynthesizer;

// ---------------------------------------------------------------------------
// Cycle phase
// ---------------------------------------------------------------------------

/// Orchestrator state, advanced once per phase within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Classifying,
    Synthesizing,
    Reporting,
    Failed,
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Classifying => "classifying",
            Self::Synthesizing => "synthesizing",
            Self::Reporting => "reporting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Configuration and cycle summary
// ---------------------------------------------------------------------------

/// Runtime settings for the orchestrator, merged from config + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fetch window looking back from "now", in minutes.
    pub window_minutes: u32,
    /// Fallback lookback in days, used when a cycle is run with `fallback`.
    pub fallback_days: u32,
    /// Where the report is written.
    pub report_path: PathBuf,
}

/// Outcome of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    /// New (unseen) records fetched this cycle.
    pub fetched: usize,
    /// Records confirmed relevant.
    pub relevant: usize,
    /// Records excluded because classification was unavailable.
    pub classification_errors: usize,
    /// Relevant records whose impact synthesis failed.
    pub synthesis_errors: usize,
    /// Dedup cache size after the cycle.
    pub cache_size: usize,
    /// Report location, when one was written.
    pub report_path: Option<PathBuf>,
    /// Severity counts of the written report.
    pub breakdown: Option<SeverityBreakdown>,
    pub elapsed: Duration,
}

/// Progress callback for cycle execution (CLI spinner, silent in tests).
pub trait CycleObserver: Send + Sync {
    /// Called when the orchestrator enters a new phase.
    fn phase(&self, phase: CyclePhase);
    /// Per-record progress within the current phase.
    fn record_progress(&self, current: usize, total: usize, cve_id: &str);
    /// Called once a cycle completes successfully.
    fn cycle_complete(&self, summary: &CycleSummary);
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl CycleObserver for SilentObserver {
    fn phase(&self, _phase: CyclePhase) {}
    fn record_progress(&self, _current: usize, _total: usize, _cve_id: &str) {}
    fn cycle_complete(&self, _summary: &CycleSummary) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The monitoring pipeline. Owns the dedup cache exclusively for the
/// duration of each cycle; no concurrent cycles may share one.
pub struct Pipeline {
    feed: FeedClient,
    classifier: RelevanceClassifier,
    synthesizer: ImpactSynthesizer,
    cache: Box<dyn DedupCache>,
    config: PipelineConfig,
    phase: CyclePhase,
}

impl Pipeline {
    pub fn new(
        feed: FeedClient,
        classifier: RelevanceClassifier,
        synthesizer: ImpactSynthesizer,
        cache: Box<dyn DedupCache>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            feed,
            classifier,
            synthesizer,
            cache,
            config,
            phase: CyclePhase::Idle,
        }
    }

    /// Current orchestrator phase.
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Read access to the dedup cache.
    pub fn cache(&self) -> &dyn DedupCache {
        self.cache.as_ref()
    }

    /// Run one complete cycle.
    ///
    /// With `use_fallback` the fetch window covers the configured fallback
    /// days instead of the recent-minutes window (initial runs, sparse feeds).
    #[instrument(skip_all, fields(fallback = use_fallback))]
    pub async fn run_cycle(
        &mut self,
        use_fallback: bool,
        observer: &dyn CycleObserver,
    ) -> Result<CycleSummary> {
        let result = self.cycle_inner(use_fallback, observer).await;
        match &result {
            Ok(summary) => {
                self.set_phase(CyclePhase::Idle, observer);
                observer.cycle_complete(summary);
            }
            Err(e) => {
                error!(error = %e, "cycle failed");
                self.phase = CyclePhase::Failed;
            }
        }
        result
    }

    async fn cycle_inner(
        &mut self,
        use_fallback: bool,
        observer: &dyn CycleObserver,
    ) -> Result<CycleSummary> {
        let started = Instant::now();

        // --- Fetching ---
        self.set_phase(CyclePhase::Fetching, observer);
        let window_end = Utc::now();
        let window_start = if use_fallback {
            window_end - chrono::Duration::days(i64::from(self.config.fallback_days))
        } else {
            window_end - chrono::Duration::minutes(i64::from(self.config.window_minutes))
        };

        let records = self
            .feed
            .fetch_window(window_start, window_end, self.cache.as_ref())
            .await?;

        if records.is_empty() {
            info!("no new records in window");
            return Ok(CycleSummary {
                fetched: 0,
                relevant: 0,
                classification_errors: 0,
                synthesis_errors: 0,
                cache_size: self.cache.len(),
                report_path: None,
                breakdown: None,
                elapsed: started.elapsed(),
            });
        }

        // --- Classifying ---
        self.set_phase(CyclePhase::Classifying, observer);
        let fetched = records.len();
        let mut verdicts: Vec<(CveRecord, bool)> = Vec::with_capacity(fetched);
        let mut classification_errors = 0usize;

        for (idx, record) in records.into_iter().enumerate() {
            observer.record_progress(idx + 1, fetched, &record.cve_id);
            let verdict = self.classifier.classify(&record).await;

            // Marked processed whatever the outcome: a record is classified
            // at most once across all cycles.
            self.cache.insert(&record.cve_id);

            match verdict {
                Ok(true) => {
                    info!(cve_id = %record.cve_id, score = record.cvss_score, "relevant threat");
                    verdicts.push((record, true));
                }
                Ok(false) => {
                    debug!(cve_id = %record.cve_id, "not relevant");
                    verdicts.push((record, false));
                }
                Err(e) => {
                    warn!(error = %e, "record excluded from this cycle");
                    classification_errors += 1;
                }
            }
        }

        // --- Synthesizing ---
        self.set_phase(CyclePhase::Synthesizing, observer);
        let relevant = verdicts.iter().filter(|(_, v)| *v).count();
        let mut classified: Vec<ClassifiedCve> = Vec::with_capacity(verdicts.len());
        let mut synthesis_errors = 0usize;
        let mut synthesized = 0usize;

        for (record, is_relevant) in verdicts {
            if !is_relevant {
                classified.push(ClassifiedCve::irrelevant(record));
                continue;
            }

            synthesized += 1;
            observer.record_progress(synthesized, relevant, &record.cve_id);

            let impact = match self.synthesizer.synthesize(&record).await {
                Ok(text) => text,
                Err(e) => {
                    // A relevant threat never disappears because prose
                    // generation failed.
                    warn!(error = %e, "including threat without impact statement");
                    synthesis_errors += 1;
                    String::new()
                }
            };
            classified.push(ClassifiedCve::relevant(record, impact));
        }

        // Persist before report writing: a report failure must not cause
        // already-processed records to be reclassified next cycle.
        self.cache.persist()?;

        if relevant == 0 {
            info!(fetched, "no relevant threats detected");
            return Ok(CycleSummary {
                fetched,
                relevant: 0,
                classification_errors,
                synthesis_errors,
                cache_size: self.cache.len(),
                report_path: None,
                breakdown: None,
                elapsed: started.elapsed(),
            });
        }

        // --- Reporting ---
        self.set_phase(CyclePhase::Reporting, observer);
        let report = otwatch_report::build_report(&classified, Utc::now());
        let report_path = otwatch_report::save_report(&report, &self.config.report_path)?;

        Ok(CycleSummary {
            fetched,
            relevant,
            classification_errors,
            synthesis_errors,
            cache_size: self.cache.len(),
            report_path: Some(report_path),
            breakdown: Some(report.severity_breakdown.clone()),
            elapsed: started.elapsed(),
        })
    }

    /// Run cycles until `shutdown` flips to true, sleeping `interval` in
    /// between. The sleep is cancellable; a cycle in progress always runs to
    /// completion. Non-fatal cycle failures are logged and the next cycle is
    /// still attempted; dedup cache corruption terminates the loop.
    pub async fn run_continuous(
        &mut self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        observer: &dyn CycleObserver,
    ) -> Result<()> {
        info!(interval_secs = interval.as_secs(), "starting continuous monitoring");

        loop {
            if *shutdown.borrow() {
                info!("stop requested, ending monitoring loop");
                return Ok(());
            }

            match self.run_cycle(false, observer).await {
                Ok(summary) => {
                    info!(
                        fetched = summary.fetched,
                        relevant = summary.relevant,
                        "cycle complete"
                    );
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "fatal error, stopping monitoring");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "cycle failed, next cycle still scheduled");
                }
            }

            let sleep = tokio::time::sleep(interval);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("stop requested, ending monitoring loop");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn set_phase(&mut self, phase: CyclePhase, observer: &dyn CycleObserver) {
        debug!(%phase, "entering phase");
        self.phase = phase;
        observer.phase(phase);
    }
}
