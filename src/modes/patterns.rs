use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{describe_service_error, ModeCore, PartialFailure};
use crate::config::EngineConfig;
use crate::evidence::{count_by_type, EvidenceChunk, EvidenceFilter, EvidenceStore, EvidenceType, Pattern, Polarity};
use crate::services::{Candidate, RelevanceRequest};
use crate::trace::{ReasoningTrace, StepKind};

/// Words of the seed chunk used as a fallback theme label.
const THEME_WORDS: usize = 8;

/// How an expected evidence type falls short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapKind {
    Missing,
    Thin { found: usize, required: usize },
}

/// A named shortfall in evidence coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub evidence_type: EvidenceType,
    #[serde(flatten)]
    pub kind: GapKind,
    pub description: String,
    /// Research action that would close the gap.
    pub suggestion: String,
}

fn gap_consequence(evidence_type: EvidenceType) -> &'static str {
    match evidence_type {
        EvidenceType::AnalyticsData => "confidence in usage-based claims is limited to self-report",
        EvidenceType::UserQuote => "claims about user needs rest on second-hand signals",
        EvidenceType::BehavioralObservation => "what users say is not checked against what they do",
        EvidenceType::SupportTicket => "how often the problem occurs in the field is unknown",
        EvidenceType::StakeholderInput => "internal constraints and priorities are not represented",
        EvidenceType::CompetitorIntel => "alternatives users could switch to are not considered",
    }
}

fn gap_suggestion(evidence_type: EvidenceType) -> &'static str {
    match evidence_type {
        EvidenceType::AnalyticsData => "Pull usage metrics or funnel data for the affected flow",
        EvidenceType::UserQuote => "Run short user interviews and capture direct quotes",
        EvidenceType::BehavioralObservation => "Watch session recordings or run a usability test",
        EvidenceType::SupportTicket => "Review recent support tickets for this area",
        EvidenceType::StakeholderInput => "Ask sales, support and leadership for their view",
        EvidenceType::CompetitorIntel => "Check how competitors handle the same problem",
    }
}

/// Compare present evidence types against the expected coverage.
///
/// Every expected type that is absent, or present fewer than
/// `min_per_type` times, yields exactly one gap, in `expected` order.
pub fn detect_gaps(chunks: &[EvidenceChunk], expected: &[EvidenceType], min_per_type: usize) -> Vec<Gap> {
    let counts = count_by_type(chunks.iter());
    let mut gaps = Vec::new();
    let mut seen = Vec::new();

    for &evidence_type in expected {
        if seen.contains(&evidence_type) {
            continue;
        }
        seen.push(evidence_type);

        let found = counts.get(&evidence_type).copied().unwrap_or(0);
        let kind = if found == 0 {
            GapKind::Missing
        } else if found < min_per_type {
            GapKind::Thin {
                found,
                required: min_per_type,
            }
        } else {
            continue;
        };

        let description = match kind {
            GapKind::Missing => format!(
                "no {} evidence found; {}",
                evidence_type,
                gap_consequence(evidence_type)
            ),
            GapKind::Thin { found, required } => format!(
                "only {} {} chunk(s) found (minimum {}); {}",
                found,
                evidence_type,
                required,
                gap_consequence(evidence_type)
            ),
        };

        gaps.push(Gap {
            evidence_type,
            kind,
            description,
            suggestion: gap_suggestion(evidence_type).to_string(),
        });
    }
    gaps
}

/// Clusters, contradictions and gaps over a set of chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSet {
    pub patterns: Vec<Pattern>,
    /// Chunks that did not end up in any pattern.
    pub unclustered: Vec<String>,
    pub gaps: Vec<Gap>,
    /// Chunks examined, in store order.
    pub examined: Vec<String>,
    pub partial_failure: Option<PartialFailure>,
    pub trace: ReasoningTrace,
}

impl PatternSet {
    pub fn contradictions(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter().filter(|p| p.contradiction_flag)
    }
}

/// Groups evidence into themes by semantic similarity.
#[derive(Clone)]
pub struct PatternSynthesizer {
    core: ModeCore,
    config: EngineConfig,
}

impl PatternSynthesizer {
    pub fn new(core: ModeCore, config: EngineConfig) -> Self {
        Self { core, config }
    }

    /// Cluster the current chunks matching `filter` and report coverage gaps.
    ///
    /// A service failure ends clustering early; clusters found so far are kept.
    pub async fn synthesize(&self, store: &EvidenceStore, filter: EvidenceFilter) -> PatternSet {
        let start = Instant::now();
        let chunks: Vec<EvidenceChunk> = store.query(filter).iter().cloned().collect();
        let examined: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let threshold = self.config.cluster_threshold;

        let mut trace = ReasoningTrace::new();
        trace.record(
            StepKind::Count,
            format!("Examined {} evidence chunk(s) for patterns", chunks.len()),
            examined.clone(),
        );

        let mut patterns = Vec::new();
        let mut unclustered = Vec::new();
        let mut partial_failure = None;
        let mut unassigned: Vec<&EvidenceChunk> = chunks.iter().collect();

        while !unassigned.is_empty() {
            let seed = unassigned.remove(0);

            if unassigned.is_empty() {
                self.leave_unclustered(seed, &mut unclustered, &mut trace);
                break;
            }

            let request = RelevanceRequest {
                claim_text: seed.text.clone(),
                candidates: unassigned.iter().map(|c| Candidate::from(*c)).collect(),
            };
            let response = match self.core.relevance().assess(request).await {
                Ok(response) => response,
                Err(e) => {
                    let remaining: Vec<String> = std::iter::once(seed)
                        .chain(unassigned.iter().copied())
                        .map(|c| c.id.clone())
                        .collect();
                    let explanation = format!(
                        "pattern synthesis incomplete: {} of {} chunks clustered before the relevance service failed",
                        chunks.len() - remaining.len() - unclustered.len(),
                        chunks.len()
                    );
                    warn!(error = %e, remaining = remaining.len(), "{}", explanation);
                    trace.record(
                        StepKind::ServiceFailure,
                        format!("{}; {}", describe_service_error("relevance", &e), explanation),
                        remaining.clone(),
                    );
                    unclustered.extend(remaining);
                    partial_failure = Some(PartialFailure::new("relevance", &e, explanation));
                    break;
                }
            };

            let mut members = vec![seed.id.clone()];
            let mut supporting = vec![seed.id.clone()];
            let mut contradicting = Vec::new();
            unassigned.retain(|chunk| {
                let joined = response
                    .for_chunk(&chunk.id)
                    .filter(|a| a.relevance_score >= threshold);
                match joined {
                    Some(a) => {
                        members.push(chunk.id.clone());
                        match a.polarity {
                            Polarity::Supporting => supporting.push(chunk.id.clone()),
                            Polarity::Contradicting => contradicting.push(chunk.id.clone()),
                            Polarity::Neutral => {}
                        }
                        false
                    }
                    None => true,
                }
            });

            if members.len() < self.config.min_pattern_size {
                self.leave_unclustered(seed, &mut unclustered, &mut trace);
                continue;
            }

            let theme = response
                .theme
                .clone()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| seed_theme(&seed.text));

            trace.record(
                StepKind::Finding,
                format!(
                    "Pattern \"{}\": {} chunk(s) at similarity >= {:.2} to the seed",
                    theme,
                    members.len(),
                    threshold
                ),
                members.clone(),
            );
            if !contradicting.is_empty() {
                trace.record(
                    StepKind::Finding,
                    format!(
                        "Pattern \"{}\" contains {} chunk(s) opposing the seed's claim",
                        theme,
                        contradicting.len()
                    ),
                    std::iter::once(seed.id.clone()).chain(contradicting.iter().cloned()),
                );
            }

            debug!(theme = %theme, members = members.len(), "Pattern found");
            patterns.push(Pattern {
                id: uuid::Uuid::new_v4().to_string(),
                theme,
                contradiction_flag: !contradicting.is_empty(),
                member_chunk_ids: members,
                supporting_chunk_ids: supporting,
                contradicting_chunk_ids: contradicting,
            });
        }

        let gaps = detect_gaps(&chunks, &self.config.expected_coverage, self.config.min_per_type);
        for gap in &gaps {
            trace.record(StepKind::Gap, gap.description.clone(), examined.clone());
        }

        info!(
            patterns = patterns.len(),
            unclustered = unclustered.len(),
            gaps = gaps.len(),
            complete = partial_failure.is_none(),
            latency_ms = start.elapsed().as_millis(),
            "Pattern synthesis completed"
        );

        PatternSet {
            patterns,
            unclustered,
            gaps,
            examined,
            partial_failure,
            trace,
        }
    }

    fn leave_unclustered(
        &self,
        chunk: &EvidenceChunk,
        unclustered: &mut Vec<String>,
        trace: &mut ReasoningTrace,
    ) {
        trace.record(
            StepKind::Info,
            format!(
                "Left unclustered: fewer than {} chunk(s) share its theme",
                self.config.min_pattern_size
            ),
            [chunk.id.clone()],
        );
        unclustered.push(chunk.id.clone());
    }
}

fn seed_theme(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut theme = words.iter().take(THEME_WORDS).copied().collect::<Vec<_>>().join(" ");
    if words.len() > THEME_WORDS {
        theme.push_str("...");
    }
    theme
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::modes::test_support::core_with;
    use crate::services::{ChunkAssessment, MockRelevanceService, RelevanceResponse};
    use pretty_assertions::assert_eq;

    fn chunk(text: &str, evidence_type: EvidenceType) -> EvidenceChunk {
        EvidenceChunk::new(text, evidence_type, "test").unwrap()
    }

    /// Chunks are related when they share the first word; "not" in the text flips polarity.
    fn mock_by_first_word() -> MockRelevanceService {
        let mut mock = MockRelevanceService::new();
        mock.expect_assess().returning(|request| {
            let seed_word = request.claim_text.split_whitespace().next().unwrap_or("").to_string();
            let assessments = request
                .candidates
                .iter()
                .map(|c| {
                    let related = c.text.split_whitespace().next() == Some(seed_word.as_str());
                    ChunkAssessment {
                        chunk_id: c.id.clone(),
                        relevance_score: if related { 0.8 } else { 0.1 },
                        polarity: if related && c.text.contains(" not ") {
                            Polarity::Contradicting
                        } else if related {
                            Polarity::Supporting
                        } else {
                            Polarity::Neutral
                        },
                    }
                })
                .collect();
            Ok(RelevanceResponse {
                assessments,
                theme: None,
            })
        });
        mock
    }

    fn synthesizer(mock: MockRelevanceService) -> PatternSynthesizer {
        PatternSynthesizer::new(core_with(None, Some(mock), None), EngineConfig::default())
    }

    #[test]
    fn test_gap_detection_names_exactly_missing_type() {
        let chunks = vec![
            chunk("quote one about search", EvidenceType::UserQuote),
            chunk("quote two about filters", EvidenceType::UserQuote),
        ];
        let gaps = detect_gaps(
            &chunks,
            &[EvidenceType::AnalyticsData, EvidenceType::UserQuote],
            1,
        );
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].evidence_type, EvidenceType::AnalyticsData);
        assert_eq!(gaps[0].kind, GapKind::Missing);
        assert_eq!(
            gaps[0].description,
            "no analytics_data evidence found; confidence in usage-based claims is limited to self-report"
        );
    }

    #[test]
    fn test_gap_detection_thin_coverage() {
        let chunks = vec![chunk("one ticket", EvidenceType::SupportTicket)];
        let gaps = detect_gaps(&chunks, &[EvidenceType::SupportTicket], 2);
        assert_eq!(gaps[0].kind, GapKind::Thin { found: 1, required: 2 });
        assert!(gaps[0].description.starts_with("only 1 support_ticket chunk(s) found (minimum 2)"));
    }

    #[test]
    fn test_gap_serializes_flat() {
        let gap = detect_gaps(&[], &[EvidenceType::CompetitorIntel], 1).remove(0);
        let json = serde_json::to_value(&gap).unwrap();
        assert_eq!(json["kind"], "missing");
        assert_eq!(json["evidence_type"], "competitor_intel");
    }

    #[test]
    fn test_seed_theme() {
        assert_eq!(seed_theme("short text"), "short text");
        assert_eq!(
            seed_theme("one two three four five six seven eight nine"),
            "one two three four five six seven eight..."
        );
    }

    #[tokio::test]
    async fn test_synthesize_clusters_and_flags_contradiction() {
        let mut store = EvidenceStore::new();
        for (text, t) in [
            ("export is hard to find in the menu", EvidenceType::UserQuote),
            ("pricing page lists too many tiers", EvidenceType::UserQuote),
            ("export was used by 40% of accounts", EvidenceType::AnalyticsData),
            ("export is not a problem for our team", EvidenceType::SupportTicket),
            ("onboarding emails were ignored", EvidenceType::BehavioralObservation),
        ] {
            store.add(chunk(text, t)).unwrap();
        }

        let set = synthesizer(mock_by_first_word())
            .synthesize(&store, EvidenceFilter::new())
            .await;

        assert_eq!(set.patterns.len(), 1);
        let pattern = &set.patterns[0];
        assert_eq!(pattern.member_chunk_ids.len(), 3);
        assert_eq!(pattern.member_chunk_ids[0], store.all()[0].id);
        assert!(pattern.contradiction_flag);
        assert_eq!(pattern.contradicting_chunk_ids, vec![store.all()[3].id.clone()]);
        assert_eq!(
            pattern.supporting_chunk_ids,
            vec![store.all()[0].id.clone(), store.all()[2].id.clone()]
        );
        assert_eq!(pattern.theme, "export is hard to find in the menu");
        assert_eq!(set.unclustered.len(), 2);
        assert_eq!(set.contradictions().count(), 1);
        assert!(set.partial_failure.is_none());
        assert!(set.trace.unknown_references(&store).is_empty());
    }

    #[tokio::test]
    async fn test_synthesize_respects_filter() {
        let mut store = EvidenceStore::new();
        store.add(chunk("export is hard", EvidenceType::UserQuote)).unwrap();
        store.add(chunk("export is confusing", EvidenceType::UserQuote)).unwrap();
        store.add(chunk("export metric 12%", EvidenceType::AnalyticsData)).unwrap();

        let set = synthesizer(mock_by_first_word())
            .synthesize(&store, EvidenceFilter::new().of_type(EvidenceType::UserQuote))
            .await;

        assert_eq!(set.examined.len(), 2);
        assert_eq!(set.patterns[0].member_chunk_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_synthesize_failure_keeps_earlier_clusters() {
        let mut store = EvidenceStore::new();
        for text in ["alpha one", "alpha two", "beta one", "beta two"] {
            store.add(chunk(text, EvidenceType::UserQuote)).unwrap();
        }

        let mut inner_calls = 0;
        let mut mock = MockRelevanceService::new();
        mock.expect_assess().times(2).returning(move |request| {
            inner_calls += 1;
            if inner_calls > 1 {
                return Err(ServiceError::Unavailable {
                    message: "down".to_string(),
                });
            }
            let assessments = request
                .candidates
                .iter()
                .map(|c| ChunkAssessment {
                    chunk_id: c.id.clone(),
                    relevance_score: if c.text.starts_with("alpha") { 0.9 } else { 0.0 },
                    polarity: Polarity::Supporting,
                })
                .collect();
            Ok(RelevanceResponse {
                assessments,
                theme: Some("Alpha things".to_string()),
            })
        });

        let set = synthesizer(mock).synthesize(&store, EvidenceFilter::new()).await;

        assert_eq!(set.patterns.len(), 1);
        assert_eq!(set.patterns[0].theme, "Alpha things");
        assert_eq!(set.unclustered.len(), 2);
        let failure = set.partial_failure.unwrap();
        assert_eq!(
            failure.explanation,
            "pattern synthesis incomplete: 2 of 4 chunks clustered before the relevance service failed"
        );
    }

    #[tokio::test]
    async fn test_synthesize_empty_store_reports_all_gaps() {
        let store = EvidenceStore::new();
        let set = synthesizer(MockRelevanceService::new())
            .synthesize(&store, EvidenceFilter::new())
            .await;
        assert!(set.patterns.is_empty());
        assert_eq!(set.gaps.len(), EngineConfig::default().expected_coverage.len());
    }
}
