//! Per-utterance pipeline.
//!
//! [`EvidenceEngine::run`] takes a session projection and one utterance,
//! routes it, runs the chosen component to completion and hands back an
//! updated projection. The caller's session is never mutated.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    serialize_for_log, ConfidenceAssessment, EvidenceExtractor, ExtractionResult, HypothesisOutcome,
    HypothesisTester, Intent, IntentRouter, ModeCore, PatternSet, PatternSynthesizer, ReportGenerator,
    RoutedIntent, StakeholderReport,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::evidence::{EvidenceFilter, Session};

/// Result of one component run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "result", rename_all = "snake_case")]
pub enum PipelineOutput {
    Extraction(ExtractionResult),
    HypothesisTest(HypothesisOutcome),
    ConfidenceAssessment(ConfidenceAssessment),
    AssumptionChallenge(HypothesisOutcome),
    Patterns(PatternSet),
    Report(StakeholderReport),
    /// The router could not decide; ask the user instead of guessing.
    Clarification { question: String },
}

impl PipelineOutput {
    /// The intent this output answers, if any.
    pub fn intent(&self) -> Option<Intent> {
        match self {
            PipelineOutput::Extraction(_) => Some(Intent::Extract),
            PipelineOutput::HypothesisTest(_) => Some(Intent::HypothesisTest),
            PipelineOutput::ConfidenceAssessment(_) => Some(Intent::ConfidenceAssess),
            PipelineOutput::AssumptionChallenge(_) => Some(Intent::AssumptionChallenge),
            PipelineOutput::Patterns(_) => Some(Intent::PatternFind),
            PipelineOutput::Report(_) => Some(Intent::StakeholderReport),
            PipelineOutput::Clarification { .. } => None,
        }
    }

    /// Human-readable rendering for terminals and chat surfaces.
    pub fn to_markdown(&self) -> String {
        match self {
            PipelineOutput::Extraction(result) => {
                let mut md = format!(
                    "## Extraction\n\nAdded {} chunk(s), skipped {} duplicate(s), rejected {} item(s).\n\n",
                    result.added.len(),
                    result.duplicates.len(),
                    result.rejected
                );
                for chunk in &result.added {
                    md.push_str(&format!("- [{}] {} ({})\n", chunk.evidence_type, chunk.text, chunk.id));
                }
                if let Some(failure) = &result.partial_failure {
                    md.push_str(&format!("\n**Incomplete:** {}\n", failure.explanation));
                }
                for suggestion in &result.suggestions {
                    md.push_str(&format!("\n> {}\n", suggestion));
                }
                md
            }
            PipelineOutput::HypothesisTest(outcome) | PipelineOutput::AssumptionChallenge(outcome) => {
                let mut md = format!("## Hypothesis\n\n{}\n\n", outcome.hypothesis.statement);
                match &outcome.verdict {
                    Some(verdict) => md.push_str(&format!(
                        "**Verdict:** {} (confidence {:.2})\n\n",
                        verdict.verdict_kind, verdict.confidence
                    )),
                    None => md.push_str("**No verdict recorded.**\n\n"),
                }
                if let Some(failure) = &outcome.partial_failure {
                    md.push_str(&format!("**Incomplete:** {}\n\n", failure.explanation));
                }
                md.push_str("### Reasoning Trace\n\n");
                md.push_str(&outcome.trace.render());
                md
            }
            PipelineOutput::ConfidenceAssessment(assessment) => {
                let mut md = format!("## Confidence\n\n{}\n\n", assessment.statement);
                if let Some(breakdown) = &assessment.breakdown {
                    md.push_str(&format!(
                        "**Confidence:** {:.2} ({})\n\n",
                        breakdown.confidence, breakdown.level
                    ));
                }
                for gap in &assessment.gaps {
                    md.push_str(&format!("- Gap: {}\n", gap.description));
                }
                md.push_str("\n### Reasoning Trace\n\n");
                md.push_str(&assessment.trace.render());
                md
            }
            PipelineOutput::Patterns(set) => {
                let mut md = format!("## Patterns\n\n{} pattern(s)\n\n", set.patterns.len());
                for pattern in &set.patterns {
                    md.push_str(&format!(
                        "- {} ({} chunk(s){})\n",
                        pattern.theme,
                        pattern.member_chunk_ids.len(),
                        if pattern.contradiction_flag { ", contradictory" } else { "" }
                    ));
                }
                for gap in &set.gaps {
                    md.push_str(&format!("- Gap: {}\n", gap.description));
                }
                md
            }
            PipelineOutput::Report(report) => report.to_markdown(),
            PipelineOutput::Clarification { question } => format!("{}\n", question),
        }
    }
}

/// Updated projection plus the component result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRun {
    pub session: Session,
    pub routed: Option<RoutedIntent>,
    pub output: PipelineOutput,
}

/// Composes every component behind one entry point.
#[derive(Clone)]
pub struct EvidenceEngine {
    config: EngineConfig,
    extractor: EvidenceExtractor,
    tester: HypothesisTester,
    synthesizer: PatternSynthesizer,
    router: IntentRouter,
    reports: ReportGenerator,
}

impl EvidenceEngine {
    pub fn new(core: ModeCore, config: EngineConfig) -> Self {
        Self {
            extractor: EvidenceExtractor::new(core.clone(), &config),
            tester: HypothesisTester::new(core.clone(), config.clone()),
            synthesizer: PatternSynthesizer::new(core.clone(), config.clone()),
            router: IntentRouter::new(core, &config),
            reports: ReportGenerator::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Route `utterance` and run the chosen component on a copy of `session`.
    pub async fn run(&self, session: &Session, utterance: &str) -> EngineResult<PipelineRun> {
        let start = Instant::now();
        let mut working = session.clone();

        let routed = match self.router.route(utterance, &working).await {
            Ok(routed) => routed,
            Err(EngineError::AmbiguousIntent { question }) => {
                info!(session_id = %working.id, "Intent ambiguous, asking for clarification");
                return Ok(PipelineRun {
                    session: working,
                    routed: None,
                    output: PipelineOutput::Clarification { question },
                });
            }
            Err(e) => return Err(e),
        };

        let statement = routed.parameters.statement.clone().unwrap_or_default();
        let output = match routed.intent {
            Intent::Extract => {
                let text = routed.parameters.text.clone().unwrap_or_else(|| utterance.to_string());
                let source = routed.parameters.source.clone();
                PipelineOutput::Extraction(self.extract(&mut working, &text, source.as_deref()).await?)
            }
            Intent::HypothesisTest => {
                PipelineOutput::HypothesisTest(self.test_hypothesis(&mut working, &statement).await?)
            }
            Intent::ConfidenceAssess => {
                PipelineOutput::ConfidenceAssessment(self.assess_confidence(&working, &statement).await?)
            }
            Intent::AssumptionChallenge => {
                PipelineOutput::AssumptionChallenge(self.challenge_assumption(&mut working, &statement).await?)
            }
            Intent::PatternFind => PipelineOutput::Patterns(self.find_patterns(&working, EvidenceFilter::new()).await),
            Intent::StakeholderReport => PipelineOutput::Report(self.report(&working).await),
        };

        working.last_intent = Some(routed.intent);
        working.touch();

        info!(
            session_id = %working.id,
            intent = %routed.intent,
            chunks = working.evidence.len(),
            verdicts = working.verdicts().len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Pipeline run completed"
        );

        Ok(PipelineRun {
            session: working,
            routed: Some(routed),
            output,
        })
    }

    /// Extract evidence into `session`.
    pub async fn extract(
        &self,
        session: &mut Session,
        raw_text: &str,
        source: Option<&str>,
    ) -> EngineResult<ExtractionResult> {
        session
            .evidence
            .set_duplicate_similarity(self.config.duplicate_similarity);
        let result = self.extractor.extract(&mut session.evidence, raw_text, source).await?;
        if result.partial_failure.is_some() {
            warn!(
                session_id = %session.id,
                added = result.added.len(),
                "Extraction finished with a partial failure"
            );
        }
        Ok(result)
    }

    /// Test a hypothesis and append the verdict to `session`.
    pub async fn test_hypothesis(&self, session: &mut Session, statement: &str) -> EngineResult<HypothesisOutcome> {
        self.tester.test(session, statement).await
    }

    /// Score a claim without recording anything.
    pub async fn assess_confidence(&self, session: &Session, statement: &str) -> EngineResult<ConfidenceAssessment> {
        self.tester.assess(session, statement).await
    }

    /// Test the negation of an assumption.
    pub async fn challenge_assumption(
        &self,
        session: &mut Session,
        statement: &str,
    ) -> EngineResult<HypothesisOutcome> {
        self.tester.challenge(session, statement).await
    }

    /// Cluster the filtered evidence into patterns.
    pub async fn find_patterns(&self, session: &Session, filter: EvidenceFilter) -> PatternSet {
        self.synthesizer.synthesize(&session.evidence, filter).await
    }

    /// Report on the latest verdict, or on a fresh pattern set when there is none.
    pub async fn report(&self, session: &Session) -> StakeholderReport {
        let latest = session
            .latest_verdict()
            .and_then(|v| session.hypothesis(&v.hypothesis_id).map(|h| (v, h)));

        match latest {
            Some((verdict, hypothesis)) => {
                debug!(verdict_id = %verdict.id, "Reporting on latest verdict");
                self.reports.for_verdict(verdict, hypothesis, &session.evidence)
            }
            None => {
                debug!(session_id = %session.id, "No verdict yet, reporting on patterns");
                let set = self.find_patterns(session, EvidenceFilter::new()).await;
                debug!(
                    patterns = %serialize_for_log(&set.patterns, "report patterns"),
                    "Patterns synthesized for report"
                );
                self.reports.for_patterns(&set, &session.evidence)
            }
        }
    }
}
