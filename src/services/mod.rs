//! External-service seams.
//!
//! The engine consumes three narrow services: extraction/classification,
//! semantic relevance/polarity, and intent classification. Any
//! implementation can be plugged in through [`crate::modes::ModeCore`];
//! [`LangbaseServices`] backs all three with hosted pipes.

mod langbase;

pub use langbase::LangbaseServices;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceResult;
use crate::evidence::{EvidenceChunk, Polarity};

/// Request to the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionRequest {
    pub raw_text: String,
    pub schema_description: String,
    /// Provenance label supplied by the caller, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_hint: Option<String>,
}

/// A chunk as presented to the relevance service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub evidence_type: String,
}

impl From<&EvidenceChunk> for Candidate {
    fn from(chunk: &EvidenceChunk) -> Self {
        Self {
            id: chunk.id.clone(),
            text: chunk.text.clone(),
            evidence_type: chunk.evidence_type.as_str().to_string(),
        }
    }
}

/// Request to the relevance service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelevanceRequest {
    pub claim_text: String,
    pub candidates: Vec<Candidate>,
}

/// Per-chunk judgement returned by the relevance service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAssessment {
    pub chunk_id: String,
    pub relevance_score: f64,
    pub polarity: Polarity,
}

/// Response of the relevance service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelevanceResponse {
    pub assessments: Vec<ChunkAssessment>,
    /// Short label for what the claim and its relevant chunks share.
    #[serde(default)]
    pub theme: Option<String>,
}

impl RelevanceResponse {
    /// Assessment for one chunk, if the service returned one.
    pub fn for_chunk(&self, chunk_id: &str) -> Option<&ChunkAssessment> {
        self.assessments.iter().find(|a| a.chunk_id == chunk_id)
    }
}

/// Request to the intent service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentRequest {
    pub utterance: String,
    pub context_summary: String,
}

/// Response of the intent service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResponse {
    #[serde(alias = "intent")]
    pub intent_label: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, alias = "parameters")]
    pub extracted_parameters: serde_json::Map<String, Value>,
}

/// Segments and types raw text.
///
/// Returns the raw items; the extractor validates each one. A response that
/// does not have the expected top-level shape is a [`ServiceError::Parse`].
///
/// [`ServiceError::Parse`]: crate::error::ServiceError::Parse
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, request: ExtractionRequest) -> ServiceResult<Vec<Value>>;
}

/// Scores candidate chunks for relevance to a claim and their polarity.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelevanceService: Send + Sync {
    async fn assess(&self, request: RelevanceRequest) -> ServiceResult<RelevanceResponse>;
}

/// Classifies a free-form utterance into an operating mode.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IntentService: Send + Sync {
    async fn classify(&self, request: IntentRequest) -> ServiceResult<IntentResponse>;
}
