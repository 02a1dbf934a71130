//! Evidence data model.
//!
//! Chunks, hypotheses, verdicts and patterns, plus the per-session
//! [`EvidenceStore`] and the [`Session`] projection that the engine receives
//! and returns on every pipeline run.

mod session;
mod store;

pub use session::*;
pub use store::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::trace::ReasoningTrace;

/// Kind of research evidence a chunk represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// Direct quote from a user (interview, survey, feedback).
    UserQuote,
    /// What a user did, as opposed to what they said.
    BehavioralObservation,
    /// Feedback arriving through support channels.
    SupportTicket,
    /// Quantitative metrics or data points.
    AnalyticsData,
    /// Internal requests or opinions.
    StakeholderInput,
    /// Information about competitors.
    CompetitorIntel,
}

impl EvidenceType {
    /// Every evidence type, in declaration order.
    pub const ALL: [EvidenceType; 6] = [
        EvidenceType::UserQuote,
        EvidenceType::BehavioralObservation,
        EvidenceType::SupportTicket,
        EvidenceType::AnalyticsData,
        EvidenceType::StakeholderInput,
        EvidenceType::CompetitorIntel,
    ];

    /// Get the type name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::UserQuote => "user_quote",
            EvidenceType::BehavioralObservation => "behavioral_observation",
            EvidenceType::SupportTicket => "support_ticket",
            EvidenceType::AnalyticsData => "analytics_data",
            EvidenceType::StakeholderInput => "stakeholder_input",
            EvidenceType::CompetitorIntel => "competitor_intel",
        }
    }
}

impl std::fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EvidenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user_quote" => Ok(EvidenceType::UserQuote),
            "behavioral_observation" => Ok(EvidenceType::BehavioralObservation),
            "support_ticket" => Ok(EvidenceType::SupportTicket),
            "analytics_data" => Ok(EvidenceType::AnalyticsData),
            "stakeholder_input" => Ok(EvidenceType::StakeholderInput),
            "competitor_intel" => Ok(EvidenceType::CompetitorIntel),
            _ => Err(format!("Unknown evidence type: {}", s)),
        }
    }
}

/// Stance of a chunk relative to one particular claim.
///
/// Polarity is computed per claim and never stored on the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Supporting,
    Neutral,
    Contradicting,
}

impl Polarity {
    /// Get the polarity name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Supporting => "supporting",
            Polarity::Neutral => "neutral",
            Polarity::Contradicting => "contradicting",
        }
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Polarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "supporting" | "supports" | "support" => Ok(Polarity::Supporting),
            "neutral" | "irrelevant" | "ambiguous" => Ok(Polarity::Neutral),
            "contradicting" | "contradicts" | "counter" => Ok(Polarity::Contradicting),
            _ => Err(format!("Unknown polarity: {}", s)),
        }
    }
}

/// How clear and direct an extracted chunk is, as judged at extraction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStrength {
    Strong,
    Moderate,
    Weak,
}

impl std::str::FromStr for EvidenceStrength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strong" => Ok(EvidenceStrength::Strong),
            "moderate" => Ok(EvidenceStrength::Moderate),
            "weak" => Ok(EvidenceStrength::Weak),
            _ => Err(format!("Unknown evidence strength: {}", s)),
        }
    }
}

/// A single typed, attributable excerpt of research data.
///
/// Chunks are immutable once stored. A correction is a new chunk whose
/// `corrects` field names the chunk it replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    /// Unique chunk identifier.
    pub id: String,
    /// Verbatim excerpt.
    pub text: String,
    /// Evidence type.
    #[serde(rename = "type")]
    pub evidence_type: EvidenceType,
    /// Free-text provenance label.
    pub source: String,
    /// Themes or keywords noted at extraction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Extraction-time strength judgement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<EvidenceStrength>,
    /// Classifier confidence for the type assignment (0.0-1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_confidence: Option<f64>,
    /// ID of the chunk this one corrects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrects: Option<String>,
    /// When the chunk was created.
    pub created_at: DateTime<Utc>,
}

impl EvidenceChunk {
    /// Create a chunk, rejecting blank text.
    pub fn new(
        text: impl Into<String>,
        evidence_type: EvidenceType,
        source: impl Into<String>,
    ) -> EngineResult<Self> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return Err(EngineError::Validation {
                field: "text".to_string(),
                reason: "Evidence text cannot be empty".to_string(),
            });
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            text,
            evidence_type,
            source: source.into(),
            tags: Vec::new(),
            strength: None,
            extraction_confidence: None,
            corrects: None,
            created_at: Utc::now(),
        })
    }

    /// Attach extraction tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Attach an extraction-time strength.
    pub fn with_strength(mut self, strength: EvidenceStrength) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Attach the classifier's confidence in the type assignment.
    pub fn with_extraction_confidence(mut self, confidence: f64) -> Self {
        self.extraction_confidence = Some(confidence);
        self
    }

    /// Number of whitespace-separated words in the excerpt.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// A claim under test, owned by the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Unique hypothesis identifier.
    pub id: String,
    /// Normalized statement text.
    pub statement: String,
    /// When the hypothesis was registered.
    pub created_at: DateTime<Utc>,
    /// For assumption challenges, the hypothesis whose negation this is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenges: Option<String>,
}

impl Hypothesis {
    /// Create a hypothesis from a raw statement.
    pub fn new(statement: &str) -> EngineResult<Self> {
        let statement = normalize_statement(statement);
        if statement.is_empty() {
            return Err(EngineError::Validation {
                field: "statement".to_string(),
                reason: "Hypothesis statement cannot be empty".to_string(),
            });
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            statement,
            created_at: Utc::now(),
            challenges: None,
        })
    }

    /// Mark this hypothesis as the challenge of another.
    pub fn challenging(mut self, hypothesis_id: impl Into<String>) -> Self {
        self.challenges = Some(hypothesis_id.into());
        self
    }
}

/// Trim, collapse internal whitespace, and drop trailing sentence punctuation.
pub fn normalize_statement(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['.', '!', '?'])
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Categorical outcome of testing one hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictKind {
    Supported,
    PartiallySupported,
    Contradicted,
    InsufficientEvidence,
}

impl VerdictKind {
    /// Get the verdict name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictKind::Supported => "SUPPORTED",
            VerdictKind::PartiallySupported => "PARTIALLY_SUPPORTED",
            VerdictKind::Contradicted => "CONTRADICTED",
            VerdictKind::InsufficientEvidence => "INSUFFICIENT_EVIDENCE",
        }
    }
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of the dedicated search for counter-evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterSearch {
    /// Whether the search completed.
    pub performed: bool,
    /// Every counter chunk known once the search completed: those the
    /// primary pass classified as contradicting, then those found only by
    /// the negated-claim search. SUPPORTED requires this to be empty.
    pub hits: Vec<String>,
    /// The subset of `hits` found only by the negated-claim search.
    #[serde(default)]
    pub from_negation: Vec<String>,
    /// Why the search did not complete, if it did not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Outcome of one hypothesis test. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Unique verdict identifier.
    pub id: String,
    /// The hypothesis tested.
    pub hypothesis_id: String,
    /// Categorical verdict.
    pub verdict_kind: VerdictKind,
    /// Quality-weighted confidence (0.0-1.0).
    pub confidence: f64,
    /// Summed weight of supporting chunks.
    pub supporting_weight: f64,
    /// Summed weight of counter chunks.
    pub counter_weight: f64,
    /// Chunks supporting the hypothesis.
    pub supporting_chunk_ids: Vec<String>,
    /// Chunks contradicting the hypothesis.
    pub counter_chunk_ids: Vec<String>,
    /// The explicit counter-evidence search.
    pub counter_search: CounterSearch,
    /// How the verdict was reached.
    pub trace: ReasoningTrace,
    /// When the test ran.
    pub created_at: DateTime<Utc>,
}

/// A cluster of chunks sharing a theme. Derived, never a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique pattern identifier.
    pub id: String,
    /// Theme label.
    pub theme: String,
    /// Members, seed first, in store order otherwise.
    pub member_chunk_ids: Vec<String>,
    /// The seed plus members whose polarity agrees with the cluster's implicit claim.
    #[serde(default)]
    pub supporting_chunk_ids: Vec<String>,
    /// Members whose polarity opposes the cluster's implicit claim.
    pub contradicting_chunk_ids: Vec<String>,
    /// True when members disagree about the implicit claim.
    pub contradiction_flag: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_type_round_trip_names() {
        for evidence_type in EvidenceType::ALL {
            let parsed: EvidenceType = evidence_type.as_str().parse().unwrap();
            assert_eq!(parsed, evidence_type);
        }
    }

    #[test]
    fn test_evidence_type_rejects_unknown() {
        let err = "market_research".parse::<EvidenceType>().unwrap_err();
        assert_eq!(err, "Unknown evidence type: market_research");
    }

    #[test]
    fn test_evidence_type_serde_snake_case() {
        let json = serde_json::to_string(&EvidenceType::BehavioralObservation).unwrap();
        assert_eq!(json, "\"behavioral_observation\"");
    }

    #[test]
    fn test_polarity_aliases() {
        assert_eq!("supports".parse::<Polarity>().unwrap(), Polarity::Supporting);
        assert_eq!("counter".parse::<Polarity>().unwrap(), Polarity::Contradicting);
        assert_eq!("Neutral".parse::<Polarity>().unwrap(), Polarity::Neutral);
        assert!("sideways".parse::<Polarity>().is_err());
    }

    #[test]
    fn test_chunk_new_trims_and_rejects_blank() {
        let chunk = EvidenceChunk::new("  I gave up at step 3  ", EvidenceType::UserQuote, "Int 1")
            .unwrap();
        assert_eq!(chunk.text, "I gave up at step 3");
        assert_eq!(chunk.word_count(), 6);

        let err = EvidenceChunk::new("   ", EvidenceType::UserQuote, "Int 1").unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "text"));
    }

    #[test]
    fn test_chunk_serializes_type_field() {
        let chunk = EvidenceChunk::new("42% drop", EvidenceType::AnalyticsData, "Dashboard").unwrap();
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "analytics_data");
        assert!(json.get("corrects").is_none());
    }

    #[test]
    fn test_normalize_statement() {
        assert_eq!(
            normalize_statement("  Users   churn because onboarding is long.  "),
            "Users churn because onboarding is long"
        );
        assert_eq!(normalize_statement("\"quoted claim\""), "quoted claim");
        assert_eq!(normalize_statement("   "), "");
    }

    #[test]
    fn test_hypothesis_new_rejects_empty() {
        let err = Hypothesis::new(" . ").unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "statement"));
    }

    #[test]
    fn test_verdict_kind_serde() {
        let json = serde_json::to_string(&VerdictKind::PartiallySupported).unwrap();
        assert_eq!(json, "\"PARTIALLY_SUPPORTED\"");
        assert_eq!(VerdictKind::InsufficientEvidence.to_string(), "INSUFFICIENT_EVIDENCE");
    }
}
