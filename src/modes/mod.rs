//! Engine components.
//!
//! This module provides the operating modes of the engine and the pieces
//! they are built from:
//! - [`EvidenceExtractor`]: raw text to typed, deduplicated evidence chunks
//! - [`ConfidenceScorer`]: quality-weighted confidence over supporting and counter evidence
//! - [`HypothesisTester`]: retrieval, partition, counter search and verdict mapping
//! - [`PatternSynthesizer`]: theme clustering, contradiction flags and coverage gaps
//! - [`IntentRouter`]: utterance to operating mode plus parameters
//! - [`ReportGenerator`]: deterministic stakeholder reports
//! - [`EvidenceEngine`]: one pipeline run per utterance
//!
//! All components share the external services via [`ModeCore`] composition.

mod core;
mod extractor;
mod hypothesis;
mod patterns;
mod pipeline;
mod report;
mod router;
mod scorer;

pub use self::core::*;
pub use extractor::*;
pub use hypothesis::*;
pub use patterns::*;
pub use pipeline::*;
pub use report::*;
pub use router::*;
pub use scorer::*;

#[cfg(test)]
pub(crate) use self::core::test_support;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, ServiceError};

// ============================================================================
// Shared Utilities
// ============================================================================

/// Serialize a value to JSON for logging, with warning on failure.
pub(crate) fn serialize_for_log<T: serde::Serialize>(
    value: &T,
    context: &str,
) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(
            error = %e,
            context = %context,
            "Failed to serialize value for log"
        );
        serde_json::json!({
            "serialization_error": e.to_string(),
            "context": context
        })
    })
}

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Try parsing as raw JSON first (fast path)
/// 2. Extract from ```json ... ``` code blocks
/// 3. Extract from ``` ... ``` code blocks
/// 4. Return error if none work
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    // Fast path: raw JSON
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Operating modes an utterance can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Turn raw research text into evidence chunks.
    Extract,
    /// Test a hypothesis against current evidence.
    HypothesisTest,
    /// Cluster evidence into themes and report gaps.
    PatternFind,
    /// Score evidence for a claim without recording a verdict.
    ConfidenceAssess,
    /// Test the negation of an assumption.
    AssumptionChallenge,
    /// Assemble a report for stakeholders.
    StakeholderReport,
}

impl Intent {
    /// Every intent, in declaration order.
    pub const ALL: [Intent; 6] = [
        Intent::Extract,
        Intent::HypothesisTest,
        Intent::PatternFind,
        Intent::ConfidenceAssess,
        Intent::AssumptionChallenge,
        Intent::StakeholderReport,
    ];

    /// Get the intent name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Extract => "extract",
            Intent::HypothesisTest => "hypothesis_test",
            Intent::PatternFind => "pattern_find",
            Intent::ConfidenceAssess => "confidence_assess",
            Intent::AssumptionChallenge => "assumption_challenge",
            Intent::StakeholderReport => "stakeholder_report",
        }
    }

    /// Whether the mode needs a hypothesis statement.
    pub fn needs_statement(&self) -> bool {
        matches!(
            self,
            Intent::HypothesisTest | Intent::ConfidenceAssess | Intent::AssumptionChallenge
        )
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "extract" | "extraction" => Ok(Intent::Extract),
            "hypothesis_test" | "hypothesis" | "test" => Ok(Intent::HypothesisTest),
            "pattern_find" | "patterns" | "synthesis" => Ok(Intent::PatternFind),
            "confidence_assess" | "confidence" => Ok(Intent::ConfidenceAssess),
            "assumption_challenge" | "challenge" | "counter_evidence" | "devils_advocate" => {
                Ok(Intent::AssumptionChallenge)
            }
            "stakeholder_report" | "report" | "stakeholder_output" => Ok(Intent::StakeholderReport),
            _ => Err(format!("Unknown intent: {}", s)),
        }
    }
}

/// Why an external-service step did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    RateLimit,
    Unavailable,
    /// The service answered, but not in the expected shape.
    Malformed,
}

/// An aborted step whose already-produced results were kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialFailure {
    /// Service that failed.
    pub service: String,
    pub kind: FailureKind,
    /// Plain-language account of what was and was not completed.
    pub explanation: String,
}

impl PartialFailure {
    /// Build from a service error with an explanation of what was kept.
    pub fn new(service: &str, error: &ServiceError, explanation: impl Into<String>) -> Self {
        let kind = match error {
            ServiceError::Timeout { .. } => FailureKind::Timeout,
            ServiceError::RateLimited { .. } => FailureKind::RateLimit,
            ServiceError::Unavailable { .. } => FailureKind::Unavailable,
            ServiceError::Parse { .. } => FailureKind::Malformed,
        };
        Self {
            service: service.to_string(),
            kind,
            explanation: explanation.into(),
        }
    }
}

/// Describe a service error the way it would surface at engine level.
pub(crate) fn describe_service_error(service: &str, error: &ServiceError) -> String {
    let engine: EngineError = error.clone().into_engine_error(service);
    engine.to_string()
}
