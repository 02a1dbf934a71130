//! Quality-weighted confidence scoring.
//!
//! The number of chunks alone never raises confidence: each chunk is weighted
//! by how direct its evidence type is and how specific its text is.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::evidence::{EvidenceChunk, EvidenceType, Polarity};
use crate::trace::{ReasoningTrace, StepKind};

/// Guards the division when both sides are empty.
const EPSILON: f64 = 1e-9;

/// Word count at which an excerpt stops being penalised for brevity.
const SPECIFIC_WORDS: f64 = 12.0;

/// Fixed ranking of evidence types by directness.
pub fn source_type_weight(evidence_type: EvidenceType) -> f64 {
    match evidence_type {
        EvidenceType::AnalyticsData => 1.0,
        EvidenceType::BehavioralObservation => 0.9,
        EvidenceType::UserQuote => 0.7,
        EvidenceType::SupportTicket => 0.6,
        EvidenceType::CompetitorIntel => 0.5,
        EvidenceType::StakeholderInput => 0.4,
    }
}

/// Downweight short, generic excerpts. Range [0.4, 1.0].
pub fn specificity_factor(text: &str) -> f64 {
    let words = text.split_whitespace().count() as f64;
    let mut factor = (0.4 + 0.6 * words / SPECIFIC_WORDS).min(1.0);
    if text.chars().any(|c| c.is_ascii_digit()) {
        factor = (factor + 0.15).min(1.0);
    }
    factor
}

/// Qualitative confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One chunk's share of the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkContribution {
    pub chunk_id: String,
    pub evidence_type: EvidenceType,
    pub polarity: Polarity,
    pub source_weight: f64,
    pub specificity: f64,
    pub weight: f64,
}

/// Confidence plus everything needed to explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub confidence: f64,
    pub supporting_weight: f64,
    pub counter_weight: f64,
    pub contributions: Vec<ChunkContribution>,
    pub distinct_types: usize,
    pub level: ConfidenceLevel,
}

impl ConfidenceBreakdown {
    pub fn chunk_count(&self) -> usize {
        self.contributions.len()
    }

    pub fn supporting_ids(&self) -> Vec<String> {
        self.ids_with(Polarity::Supporting)
    }

    pub fn counter_ids(&self) -> Vec<String> {
        self.ids_with(Polarity::Contradicting)
    }

    fn ids_with(&self, polarity: Polarity) -> Vec<String> {
        self.contributions
            .iter()
            .filter(|c| c.polarity == polarity)
            .map(|c| c.chunk_id.clone())
            .collect()
    }

    /// Append one step per contribution and a summary step to a trace.
    pub fn record(&self, trace: &mut ReasoningTrace) {
        for c in &self.contributions {
            trace.record(
                StepKind::Contribution,
                format!(
                    "{} {} chunk weighs {:.2} (source weight {:.2} x specificity {:.2})",
                    c.polarity, c.evidence_type, c.weight, c.source_weight, c.specificity
                ),
                [c.chunk_id.clone()],
            );
        }
        let all_ids: Vec<String> = self.contributions.iter().map(|c| c.chunk_id.clone()).collect();
        trace.record(
            StepKind::Finding,
            format!(
                "Confidence {:.2} = supporting {:.2} / (supporting {:.2} + counter {:.2}); {} distinct evidence type(s) across {} chunk(s), level {}",
                self.confidence,
                self.supporting_weight,
                self.supporting_weight,
                self.counter_weight,
                self.distinct_types,
                self.chunk_count(),
                self.level
            ),
            all_ids,
        );
    }
}

/// Computes confidence from supporting and counter chunk sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Weight of a single chunk.
    pub fn weight(&self, chunk: &EvidenceChunk) -> f64 {
        source_type_weight(chunk.evidence_type) * specificity_factor(&chunk.text)
    }

    /// Score supporting against counter evidence.
    pub fn score(&self, supporting: &[&EvidenceChunk], counter: &[&EvidenceChunk]) -> ConfidenceBreakdown {
        let mut contributions = Vec::with_capacity(supporting.len() + counter.len());
        let mut types = BTreeSet::new();

        let mut tally = |chunks: &[&EvidenceChunk], polarity: Polarity| -> f64 {
            let mut total = 0.0;
            for chunk in chunks {
                let source_weight = source_type_weight(chunk.evidence_type);
                let specificity = specificity_factor(&chunk.text);
                let weight = source_weight * specificity;
                total += weight;
                types.insert(chunk.evidence_type);
                contributions.push(ChunkContribution {
                    chunk_id: chunk.id.clone(),
                    evidence_type: chunk.evidence_type,
                    polarity,
                    source_weight,
                    specificity,
                    weight,
                });
            }
            total
        };

        let supporting_weight = tally(supporting, Polarity::Supporting);
        let counter_weight = tally(counter, Polarity::Contradicting);

        let confidence =
            (supporting_weight / (supporting_weight + counter_weight + EPSILON)).clamp(0.0, 1.0);
        let distinct_types = types.len();
        let level = confidence_level(confidence, distinct_types, contributions.len());

        ConfidenceBreakdown {
            confidence,
            supporting_weight,
            counter_weight,
            contributions,
            distinct_types,
            level,
        }
    }
}

/// Level from type diversity and volume, capped by the numeric confidence.
pub fn confidence_level(confidence: f64, distinct_types: usize, chunks: usize) -> ConfidenceLevel {
    if distinct_types >= 3 && chunks >= 8 && confidence >= 0.75 {
        ConfidenceLevel::High
    } else if distinct_types >= 2 && chunks >= 4 && confidence >= 0.5 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}
