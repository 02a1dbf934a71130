use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    describe_service_error, detect_gaps, ConfidenceBreakdown, ConfidenceScorer, Gap, ModeCore,
    PartialFailure,
};
use crate::config::EngineConfig;
use crate::error::{EngineResult, ServiceError};
use crate::evidence::{
    normalize_statement, CounterSearch, EvidenceChunk, EvidenceStore, Hypothesis, Polarity,
    Session, Verdict, VerdictKind,
};
use crate::services::{Candidate, RelevanceRequest};
use crate::trace::{ReasoningTrace, StepKind};

/// Prefix used to phrase the negation of a statement.
pub const NEGATION_PREFIX: &str = "It is not the case that ";

/// Negate a statement for counter search and assumption challenges.
///
/// A statement that is already a negation of this form is unwrapped instead.
pub fn negate_statement(statement: &str) -> String {
    let statement = normalize_statement(statement);
    let prefix_len = NEGATION_PREFIX.len();
    if statement.len() > prefix_len
        && statement.is_char_boundary(prefix_len)
        && statement[..prefix_len].eq_ignore_ascii_case(NEGATION_PREFIX)
    {
        return statement[prefix_len..].trim().to_string();
    }
    format!("{}{}", NEGATION_PREFIX, statement)
}

/// Map scored evidence to a verdict kind, with the comparison that decided it.
pub fn decide_verdict(
    relevant: usize,
    breakdown: &ConfidenceBreakdown,
    counter_search: &CounterSearch,
    config: &EngineConfig,
) -> (VerdictKind, String) {
    if relevant < config.min_evidence {
        return (
            VerdictKind::InsufficientEvidence,
            format!(
                "{} relevant non-neutral chunk(s) < minimum {}: insufficient evidence",
                relevant, config.min_evidence
            ),
        );
    }

    if breakdown.counter_weight > breakdown.supporting_weight
        && breakdown.confidence < config.contradicted_confidence
    {
        return (
            VerdictKind::Contradicted,
            format!(
                "counter weight {:.2} > supporting weight {:.2} and confidence {:.2} < {:.2}: contradicted",
                breakdown.counter_weight,
                breakdown.supporting_weight,
                breakdown.confidence,
                config.contradicted_confidence
            ),
        );
    }

    if breakdown.confidence >= config.supported_confidence {
        if counter_search.performed && counter_search.hits.is_empty() {
            return (
                VerdictKind::Supported,
                format!(
                    "confidence {:.2} >= {:.2} and the counter-evidence search found none: supported",
                    breakdown.confidence, config.supported_confidence
                ),
            );
        }
        let reason = if counter_search.performed {
            format!("{} counter chunk(s) found", counter_search.hits.len())
        } else {
            "the counter-evidence search did not complete".to_string()
        };
        return (
            VerdictKind::PartiallySupported,
            format!(
                "confidence {:.2} >= {:.2} but {}: partially supported",
                breakdown.confidence, config.supported_confidence, reason
            ),
        );
    }

    (
        VerdictKind::PartiallySupported,
        format!(
            "confidence {:.2} between {:.2} and {:.2}: partially supported (mixed signals)",
            breakdown.confidence, config.contradicted_confidence, config.supported_confidence
        ),
    )
}

/// Result of testing one hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HypothesisOutcome {
    pub hypothesis: Hypothesis,
    /// Absent only when the primary relevance call failed.
    pub verdict: Option<Verdict>,
    pub breakdown: Option<ConfidenceBreakdown>,
    pub partial_failure: Option<PartialFailure>,
    pub trace: ReasoningTrace,
}

/// Confidence in a claim without a recorded verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceAssessment {
    pub statement: String,
    pub breakdown: Option<ConfidenceBreakdown>,
    pub relevant_chunk_ids: Vec<String>,
    pub gaps: Vec<Gap>,
    pub partial_failure: Option<PartialFailure>,
    pub trace: ReasoningTrace,
}

/// Evidence partitioned for one claim.
struct Evaluation {
    supporting: Vec<EvidenceChunk>,
    counter: Vec<EvidenceChunk>,
    counter_search: CounterSearch,
    breakdown: ConfidenceBreakdown,
    partial_failure: Option<PartialFailure>,
}

/// Tests hypotheses against current evidence.
#[derive(Clone)]
pub struct HypothesisTester {
    core: ModeCore,
    config: EngineConfig,
    scorer: ConfidenceScorer,
}

impl HypothesisTester {
    pub fn new(core: ModeCore, config: EngineConfig) -> Self {
        Self {
            core,
            config,
            scorer: ConfidenceScorer::new(),
        }
    }

    /// Test a statement and append the verdict to the session history.
    pub async fn test(&self, session: &mut Session, statement: &str) -> EngineResult<HypothesisOutcome> {
        let hypothesis = session.register_hypothesis(statement)?.clone();
        Ok(self.run(session, hypothesis, ReasoningTrace::new()).await)
    }

    /// Test the negation of an assumption, reusing the ordinary test unchanged.
    pub async fn challenge(
        &self,
        session: &mut Session,
        statement: &str,
    ) -> EngineResult<HypothesisOutcome> {
        let original = session.register_hypothesis(statement)?.clone();
        let negated = Hypothesis::new(&negate_statement(&original.statement))?.challenging(&original.id);
        let negated = session.add_hypothesis(negated).clone();

        let mut trace = ReasoningTrace::new();
        trace.record(
            StepKind::Info,
            format!(
                "Assumption challenge: testing \"{}\" as the negation of \"{}\"",
                negated.statement, original.statement
            ),
            Vec::<String>::new(),
        );
        Ok(self.run(session, negated, trace).await)
    }

    /// Score a claim without registering it or recording a verdict.
    pub async fn assess(&self, session: &Session, statement: &str) -> EngineResult<ConfidenceAssessment> {
        let statement = Hypothesis::new(statement)?.statement;
        let mut trace = ReasoningTrace::new();
        let current: Vec<EvidenceChunk> = session.evidence.current().cloned().collect();
        let gaps = detect_gaps(&current, &self.config.expected_coverage, self.config.min_per_type);

        let evaluation = self.evaluate(&session.evidence, &statement, &mut trace).await;
        let (breakdown, relevant_chunk_ids, partial_failure) = match evaluation {
            Ok(e) => {
                let ids: Vec<String> = e
                    .supporting
                    .iter()
                    .chain(e.counter.iter())
                    .map(|c| c.id.clone())
                    .collect();
                (Some(e.breakdown), ids, e.partial_failure)
            }
            Err(failure) => (None, Vec::new(), Some(failure)),
        };

        let examined: Vec<String> = current.iter().map(|c| c.id.clone()).collect();
        for gap in &gaps {
            trace.record(StepKind::Gap, gap.description.clone(), examined.clone());
        }

        info!(
            statement = %statement,
            confidence = breakdown.as_ref().map(|b| b.confidence),
            gaps = gaps.len(),
            "Confidence assessment completed"
        );

        Ok(ConfidenceAssessment {
            statement,
            breakdown,
            relevant_chunk_ids,
            gaps,
            partial_failure,
            trace,
        })
    }

    async fn run(
        &self,
        session: &mut Session,
        hypothesis: Hypothesis,
        mut trace: ReasoningTrace,
    ) -> HypothesisOutcome {
        let start = Instant::now();
        debug!(hypothesis_id = %hypothesis.id, statement = %hypothesis.statement, "Testing hypothesis");

        let evaluation = match self
            .evaluate(&session.evidence, &hypothesis.statement, &mut trace)
            .await
        {
            Ok(evaluation) => evaluation,
            Err(failure) => {
                warn!(hypothesis_id = %hypothesis.id, "Hypothesis test aborted: {}", failure.explanation);
                return HypothesisOutcome {
                    hypothesis,
                    verdict: None,
                    breakdown: None,
                    partial_failure: Some(failure),
                    trace,
                };
            }
        };

        let relevant = evaluation.supporting.len() + evaluation.counter.len();
        let (verdict_kind, reason) = decide_verdict(
            relevant,
            &evaluation.breakdown,
            &evaluation.counter_search,
            &self.config,
        );
        let relevant_ids: Vec<String> = evaluation
            .supporting
            .iter()
            .chain(evaluation.counter.iter())
            .map(|c| c.id.clone())
            .collect();
        trace.record(
            StepKind::Threshold,
            format!("Verdict {}: {}", verdict_kind, reason),
            relevant_ids,
        );

        let verdict = Verdict {
            id: uuid::Uuid::new_v4().to_string(),
            hypothesis_id: hypothesis.id.clone(),
            verdict_kind,
            confidence: evaluation.breakdown.confidence,
            supporting_weight: evaluation.breakdown.supporting_weight,
            counter_weight: evaluation.breakdown.counter_weight,
            supporting_chunk_ids: evaluation.supporting.iter().map(|c| c.id.clone()).collect(),
            counter_chunk_ids: evaluation.counter.iter().map(|c| c.id.clone()).collect(),
            counter_search: evaluation.counter_search,
            trace: trace.clone(),
            created_at: Utc::now(),
        };
        session.record_verdict(verdict.clone());

        info!(
            hypothesis_id = %hypothesis.id,
            verdict = %verdict.verdict_kind,
            confidence = verdict.confidence,
            latency_ms = start.elapsed().as_millis(),
            "Hypothesis test completed"
        );

        HypothesisOutcome {
            hypothesis,
            verdict: Some(verdict),
            breakdown: Some(evaluation.breakdown),
            partial_failure: evaluation.partial_failure,
            trace,
        }
    }

    /// Retrieve, partition, counter-search and score. Fails only if the
    /// primary relevance call fails.
    async fn evaluate(
        &self,
        store: &EvidenceStore,
        statement: &str,
        trace: &mut ReasoningTrace,
    ) -> Result<Evaluation, PartialFailure> {
        let threshold = self.config.relevance_threshold;
        let current: Vec<&EvidenceChunk> = store.current().collect();
        let all_ids: Vec<String> = current.iter().map(|c| c.id.clone()).collect();

        trace.record(
            StepKind::Count,
            format!("Considered {} current evidence chunk(s) for \"{}\"", current.len(), statement),
            all_ids.clone(),
        );

        let mut supporting = Vec::new();
        let mut counter = Vec::new();

        if !current.is_empty() {
            let response = self
                .core
                .relevance()
                .assess(relevance_request(statement, &current))
                .await
                .map_err(|e| self.primary_failure(&e, &all_ids, trace))?;

            let mut below = Vec::new();
            let mut neutral = Vec::new();
            for chunk in &current {
                match response.for_chunk(&chunk.id) {
                    Some(a) if a.relevance_score >= threshold => match a.polarity {
                        Polarity::Supporting => supporting.push((*chunk).clone()),
                        Polarity::Contradicting => counter.push((*chunk).clone()),
                        Polarity::Neutral => neutral.push(chunk.id.clone()),
                    },
                    _ => below.push(chunk.id.clone()),
                }
            }

            if !below.is_empty() {
                trace.record(
                    StepKind::Threshold,
                    format!(
                        "{} chunk(s) below relevance threshold {:.2} ignored",
                        below.len(),
                        threshold
                    ),
                    below,
                );
            }
            if !neutral.is_empty() {
                trace.record(
                    StepKind::Info,
                    format!("{} relevant but neutral chunk(s) discarded", neutral.len()),
                    neutral,
                );
            }
            trace.record(
                StepKind::Count,
                format!(
                    "{} supporting and {} contradicting chunk(s) at relevance >= {:.2}",
                    supporting.len(),
                    counter.len(),
                    threshold
                ),
                supporting
                    .iter()
                    .chain(counter.iter())
                    .map(|c: &EvidenceChunk| c.id.clone()),
            );
        }

        let (counter_search, partial_failure) = self
            .search_counter_evidence(statement, &current, &supporting, &mut counter, trace)
            .await;

        let supporting_refs: Vec<&EvidenceChunk> = supporting.iter().collect();
        let counter_refs: Vec<&EvidenceChunk> = counter.iter().collect();
        let breakdown = self.scorer.score(&supporting_refs, &counter_refs);
        breakdown.record(trace);

        Ok(Evaluation {
            supporting,
            counter,
            counter_search,
            breakdown,
            partial_failure,
        })
    }

    /// Dedicated search for evidence supporting the negated claim.
    ///
    /// The recorded hits start from the counter set the primary pass found;
    /// new hits not already classified as supporting join it and are also
    /// listed in `from_negation`.
    async fn search_counter_evidence(
        &self,
        statement: &str,
        current: &[&EvidenceChunk],
        supporting: &[EvidenceChunk],
        counter: &mut Vec<EvidenceChunk>,
        trace: &mut ReasoningTrace,
    ) -> (CounterSearch, Option<PartialFailure>) {
        let threshold = self.config.relevance_threshold;
        let negated = negate_statement(statement);

        if current.is_empty() {
            trace.record(
                StepKind::CounterSearch,
                format!(
                    "Actively searched for counter-evidence (\"{}\"): store is empty, none found",
                    negated
                ),
                Vec::<String>::new(),
            );
            return (
                CounterSearch {
                    performed: true,
                    hits: Vec::new(),
                    from_negation: Vec::new(),
                    failure: None,
                },
                None,
            );
        }

        let response = match self
            .core
            .relevance()
            .assess(relevance_request(&negated, current))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let description = describe_service_error("relevance", &e);
                warn!(error = %e, "Counter-evidence search failed");
                trace.record(
                    StepKind::ServiceFailure,
                    format!(
                        "Counter-evidence search did not complete ({}); SUPPORTED is not reachable",
                        description
                    ),
                    Vec::<String>::new(),
                );
                let failure = PartialFailure::new(
                    "relevance",
                    &e,
                    "counter-evidence search incomplete: verdict computed without it",
                );
                return (
                    CounterSearch {
                        performed: false,
                        hits: Vec::new(),
                        from_negation: Vec::new(),
                        failure: Some(description),
                    },
                    Some(failure),
                );
            }
        };

        let mut hits: Vec<String> = counter.iter().map(|c| c.id.clone()).collect();
        let mut from_negation = Vec::new();
        for chunk in current {
            let supports_negation = response
                .for_chunk(&chunk.id)
                .map(|a| a.relevance_score >= threshold && a.polarity == Polarity::Supporting)
                .unwrap_or(false);
            let already_supporting = supporting.iter().any(|s| s.id == chunk.id);
            if supports_negation && !already_supporting && !hits.contains(&chunk.id) {
                hits.push(chunk.id.clone());
                from_negation.push(chunk.id.clone());
                counter.push((*chunk).clone());
            }
        }

        let searched: Vec<String> = current.iter().map(|c| c.id.clone()).collect();
        if hits.is_empty() {
            trace.record(
                StepKind::CounterSearch,
                format!(
                    "Actively searched {} chunk(s) for counter-evidence (\"{}\"): none found above relevance {:.2}",
                    current.len(),
                    negated,
                    threshold
                ),
                searched,
            );
        } else {
            trace.record(
                StepKind::CounterSearch,
                format!(
                    "Actively searched {} chunk(s) for counter-evidence (\"{}\"): {} counter chunk(s) above relevance {:.2}, {} found only by the negated claim",
                    current.len(),
                    negated,
                    hits.len(),
                    threshold,
                    from_negation.len()
                ),
                hits.clone(),
            );
        }

        (
            CounterSearch {
                performed: true,
                hits,
                from_negation,
                failure: None,
            },
            None,
        )
    }

    fn primary_failure(
        &self,
        error: &ServiceError,
        ids: &[String],
        trace: &mut ReasoningTrace,
    ) -> PartialFailure {
        let description = describe_service_error("relevance", error);
        trace.record(
            StepKind::ServiceFailure,
            format!("Relevance retrieval failed ({}); no verdict produced", description),
            ids.iter().cloned(),
        );
        PartialFailure::new(
            "relevance",
            error,
            "hypothesis test incomplete: relevance retrieval failed, no verdict produced",
        )
    }
}

fn relevance_request(claim: &str, chunks: &[&EvidenceChunk]) -> RelevanceRequest {
    RelevanceRequest {
        claim_text: claim.to_string(),
        candidates: chunks.iter().map(|c| Candidate::from(*c)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceType;
    use crate::modes::test_support::core_with;
    use crate::services::{ChunkAssessment, MockRelevanceService, RelevanceResponse};
    use std::collections::HashMap;

    const QUOTES: [&str; 4] = [
        "I spent most of the afternoon trying to connect my calendar and eventually gave up",
        "Honestly the calendar connection step felt confusing and I skipped it entirely that day",
        "We never managed to link our team calendars during the trial which was frustrating",
        "Connecting calendars took far too long so I stopped halfway and did something else",
    ];
    const OBSERVATIONS: [&str; 2] = [
        "Participant connected the calendar on the first attempt without any hesitation whatsoever",
        "Recorded session shows the user finishing calendar setup quickly and moving straight on",
    ];

    fn seeded_session() -> Session {
        let mut session = Session::new();
        for text in QUOTES {
            session
                .evidence
                .add(EvidenceChunk::new(text, EvidenceType::UserQuote, "Interviews").unwrap())
                .unwrap();
        }
        for text in OBSERVATIONS {
            session
                .evidence
                .add(EvidenceChunk::new(text, EvidenceType::BehavioralObservation, "Sessions").unwrap())
                .unwrap();
        }
        session
    }

    /// `primary` maps chunk text to polarity for the claim; the negated
    /// claim gets the inverse.
    fn respond(primary: &HashMap<String, Polarity>, request: &RelevanceRequest) -> RelevanceResponse {
        let negated = request.claim_text.starts_with(NEGATION_PREFIX);
        let assessments = request
            .candidates
            .iter()
            .map(|c| {
                let polarity = primary.get(&c.text).copied().unwrap_or(Polarity::Neutral);
                let polarity = match (negated, polarity) {
                    (true, Polarity::Supporting) => Polarity::Contradicting,
                    (true, Polarity::Contradicting) => Polarity::Supporting,
                    (_, p) => p,
                };
                ChunkAssessment {
                    chunk_id: c.id.clone(),
                    relevance_score: 0.9,
                    polarity,
                }
            })
            .collect();
        RelevanceResponse {
            assessments,
            theme: None,
        }
    }

    fn relevance_by_text(primary: HashMap<String, Polarity>) -> MockRelevanceService {
        let mut mock = MockRelevanceService::new();
        mock.expect_assess()
            .returning(move |request| Ok(respond(&primary, &request)));
        mock
    }

    fn tester(mock: MockRelevanceService) -> HypothesisTester {
        HypothesisTester::new(core_with(None, Some(mock), None), EngineConfig::default())
    }

    fn scenario_polarities() -> HashMap<String, Polarity> {
        QUOTES
            .iter()
            .map(|t| (t.to_string(), Polarity::Supporting))
            .chain(OBSERVATIONS.iter().map(|t| (t.to_string(), Polarity::Contradicting)))
            .collect()
    }

    #[test]
    fn test_negate_statement() {
        assert_eq!(
            negate_statement("Users churn because setup is long."),
            "It is not the case that Users churn because setup is long"
        );
        assert_eq!(
            negate_statement("it is not the case that users churn"),
            "users churn"
        );
    }

    #[tokio::test]
    async fn test_mixed_evidence_is_partially_supported() {
        let mut session = seeded_session();
        let outcome = tester(relevance_by_text(scenario_polarities()))
            .test(&mut session, "Calendar setup blocks activation")
            .await
            .unwrap();

        let verdict = outcome.verdict.unwrap();
        assert!((verdict.confidence - 0.609).abs() < 0.01);
        assert_eq!(verdict.verdict_kind, VerdictKind::PartiallySupported);
        assert_eq!(verdict.supporting_chunk_ids.len(), 4);
        assert_eq!(verdict.counter_chunk_ids.len(), 2);
        assert!(verdict.counter_search.performed);
        assert_eq!(verdict.counter_search.hits.len(), 2);
        assert_eq!(session.verdicts().len(), 1);
        assert_eq!(verdict.trace.of_kind(StepKind::Contribution).count(), 6);
        assert_eq!(verdict.trace.of_kind(StepKind::CounterSearch).count(), 1);
        assert!(verdict.trace.unknown_references(&session.evidence).is_empty());
    }

    #[tokio::test]
    async fn test_no_relevant_chunks_is_insufficient_with_zero_confidence() {
        let mut session = seeded_session();
        let outcome = tester(relevance_by_text(HashMap::new()))
            .test(&mut session, "Pricing is too high")
            .await
            .unwrap();

        let verdict = outcome.verdict.unwrap();
        assert_eq!(verdict.verdict_kind, VerdictKind::InsufficientEvidence);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_empty_store_is_insufficient_without_service_call() {
        let mut session = Session::new();
        let outcome = tester(MockRelevanceService::new())
            .test(&mut session, "Anything at all")
            .await
            .unwrap();
        let verdict = outcome.verdict.unwrap();
        assert_eq!(verdict.verdict_kind, VerdictKind::InsufficientEvidence);
        assert_eq!(verdict.confidence, 0.0);
        assert!(verdict.counter_search.performed);
    }

    #[tokio::test]
    async fn test_supported_requires_counter_search_with_no_hits() {
        let mut session = seeded_session();
        let polarities: HashMap<String, Polarity> = QUOTES
            .iter()
            .map(|t| (t.to_string(), Polarity::Supporting))
            .collect();
        let outcome = tester(relevance_by_text(polarities))
            .test(&mut session, "Calendar setup blocks activation")
            .await
            .unwrap();

        let verdict = outcome.verdict.unwrap();
        assert_eq!(verdict.verdict_kind, VerdictKind::Supported);
        assert!(verdict.counter_search.performed);
        assert!(verdict.counter_search.hits.is_empty());
        let search_step = verdict.trace.of_kind(StepKind::CounterSearch).next().unwrap();
        assert!(search_step.description.contains("none found"));
    }

    #[tokio::test]
    async fn test_counter_search_failure_blocks_supported() {
        let mut session = seeded_session();
        let polarities: HashMap<String, Polarity> = QUOTES
            .iter()
            .map(|t| (t.to_string(), Polarity::Supporting))
            .collect();
        let mut mock = MockRelevanceService::new();
        let mut calls = 0;
        // primary retrieval succeeds, the counter search times out
        mock.expect_assess().times(2).returning(move |request| {
            calls += 1;
            if calls == 1 {
                Ok(respond(&polarities, &request))
            } else {
                Err(ServiceError::Timeout { timeout_ms: 10 })
            }
        });

        let outcome = tester(mock)
            .test(&mut session, "Calendar setup blocks activation")
            .await
            .unwrap();

        let verdict = outcome.verdict.unwrap();
        assert_eq!(verdict.verdict_kind, VerdictKind::PartiallySupported);
        assert!(!verdict.counter_search.performed);
        assert!(verdict.counter_search.failure.is_some());
        assert!(outcome.partial_failure.is_some());
    }

    #[tokio::test]
    async fn test_counter_search_separates_negation_only_hits() {
        let mut session = seeded_session();
        let quotes: Vec<String> = QUOTES.iter().map(|t| t.to_string()).collect();
        let observations: Vec<String> = OBSERVATIONS.iter().map(|t| t.to_string()).collect();
        let mut mock = MockRelevanceService::new();
        // the claim sees the observations as neutral, its negation sees them as support
        mock.expect_assess().times(2).returning(move |request| {
            let negated = request.claim_text.starts_with(NEGATION_PREFIX);
            let assessments = request
                .candidates
                .iter()
                .map(|c| {
                    let polarity = if quotes.contains(&c.text) {
                        if negated { Polarity::Contradicting } else { Polarity::Supporting }
                    } else if negated && observations.contains(&c.text) {
                        Polarity::Supporting
                    } else {
                        Polarity::Neutral
                    };
                    ChunkAssessment {
                        chunk_id: c.id.clone(),
                        relevance_score: 0.9,
                        polarity,
                    }
                })
                .collect();
            Ok(RelevanceResponse {
                assessments,
                theme: None,
            })
        });

        let verdict = tester(mock)
            .test(&mut session, "Calendar setup blocks activation")
            .await
            .unwrap()
            .verdict
            .unwrap();

        assert!(verdict.counter_search.performed);
        assert_eq!(verdict.counter_search.hits.len(), 2);
        assert_eq!(verdict.counter_search.from_negation, verdict.counter_search.hits);
        assert_eq!(verdict.counter_chunk_ids.len(), 2);
        assert_ne!(verdict.verdict_kind, VerdictKind::Supported);
    }

    #[tokio::test]
    async fn test_primary_counter_chunks_are_not_negation_hits() {
        let mut session = seeded_session();
        let verdict = tester(relevance_by_text(scenario_polarities()))
            .test(&mut session, "Calendar setup blocks activation")
            .await
            .unwrap()
            .verdict
            .unwrap();

        assert_eq!(verdict.counter_search.hits.len(), 2);
        assert!(verdict.counter_search.from_negation.is_empty());
    }

    #[tokio::test]
    async fn test_contradicted_when_counter_dominates() {
        let mut session = seeded_session();
        let polarities: HashMap<String, Polarity> = QUOTES
            .iter()
            .take(1)
            .map(|t| (t.to_string(), Polarity::Supporting))
            .chain(QUOTES.iter().skip(1).map(|t| (t.to_string(), Polarity::Contradicting)))
            .chain(OBSERVATIONS.iter().map(|t| (t.to_string(), Polarity::Contradicting)))
            .collect();
        let outcome = tester(relevance_by_text(polarities))
            .test(&mut session, "Calendar setup is painless")
            .await
            .unwrap();

        let verdict = outcome.verdict.unwrap();
        assert_eq!(verdict.verdict_kind, VerdictKind::Contradicted);
        assert!(verdict.confidence < 0.3);
    }

    #[tokio::test]
    async fn test_retest_appends_new_verdict() {
        let mut session = seeded_session();
        let tester = tester(relevance_by_text(scenario_polarities()));

        let first = tester.test(&mut session, "Calendar setup blocks activation").await.unwrap();
        let second = tester.test(&mut session, "calendar setup blocks activation.").await.unwrap();

        let (a, b) = (first.verdict.unwrap(), second.verdict.unwrap());
        assert_eq!(a.hypothesis_id, b.hypothesis_id);
        assert_eq!(a.verdict_kind, b.verdict_kind);
        assert_eq!(a.confidence, b.confidence);
        assert_ne!(a.id, b.id);
        assert_eq!(session.verdicts().len(), 2);
        assert_eq!(session.hypotheses.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_statement_rejected_before_service_call() {
        let mut session = seeded_session();
        let err = tester(MockRelevanceService::new())
            .test(&mut session, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_primary_failure_yields_no_verdict() {
        let mut session = seeded_session();
        let mut mock = MockRelevanceService::new();
        mock.expect_assess()
            .times(1)
            .returning(|_| Err(ServiceError::RateLimited { retries: 3 }));

        let outcome = tester(mock)
            .test(&mut session, "Calendar setup blocks activation")
            .await
            .unwrap();

        assert!(outcome.verdict.is_none());
        assert!(session.verdicts().is_empty());
        let failure = outcome.partial_failure.unwrap();
        assert_eq!(failure.kind, crate::modes::FailureKind::RateLimit);
        assert_eq!(outcome.trace.of_kind(StepKind::ServiceFailure).count(), 1);
    }

    #[tokio::test]
    async fn test_challenge_tests_negation() {
        let mut session = seeded_session();
        let outcome = tester(relevance_by_text(scenario_polarities()))
            .challenge(&mut session, "Calendar setup blocks activation")
            .await
            .unwrap();

        assert_eq!(
            outcome.hypothesis.statement,
            "It is not the case that Calendar setup blocks activation"
        );
        let original = &session.hypotheses[0];
        assert_eq!(outcome.hypothesis.challenges.as_deref(), Some(original.id.as_str()));

        let verdict = outcome.verdict.unwrap();
        assert_eq!(verdict.supporting_chunk_ids.len(), 2);
        assert_eq!(verdict.counter_chunk_ids.len(), 4);
        assert!(verdict.confidence < 0.5);
    }

    #[tokio::test]
    async fn test_assess_reports_breakdown_and_gaps_without_verdict() {
        let session = seeded_session();
        let assessment = tester(relevance_by_text(scenario_polarities()))
            .assess(&session, "Calendar setup blocks activation")
            .await
            .unwrap();

        assert!(session.verdicts().is_empty());
        assert_eq!(assessment.relevant_chunk_ids.len(), 6);
        let breakdown = assessment.breakdown.unwrap();
        assert!((breakdown.confidence - 0.609).abs() < 0.01);
        let missing: Vec<_> = assessment.gaps.iter().map(|g| g.evidence_type).collect();
        assert!(missing.contains(&EvidenceType::AnalyticsData));
        assert!(missing.contains(&EvidenceType::SupportTicket));
    }
}
