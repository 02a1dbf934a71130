use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{describe_service_error, ModeCore, PartialFailure};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ServiceError};
use crate::evidence::{
    count_by_type, EvidenceChunk, EvidenceStore, EvidenceStrength, EvidenceType,
};
use crate::prompts::EXTRACTION_SCHEMA;
use crate::services::ExtractionRequest;
use crate::trace::{ReasoningTrace, StepKind};

/// Source label used when neither the item nor the caller names one.
pub const UNATTRIBUTED_SOURCE: &str = "unattributed";

const PREVIEW_CHARS: usize = 200;

/// A near-duplicate that was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateSkip {
    pub text: String,
    pub existing_id: String,
    pub similarity: f64,
}

/// Outcome of one extraction call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    /// Chunks added to the store, in order.
    pub added: Vec<EvidenceChunk>,
    pub duplicates: Vec<DuplicateSkip>,
    /// Number of items dropped by validation.
    pub rejected: usize,
    /// Added chunks per type.
    pub counts_by_type: BTreeMap<EvidenceType, usize>,
    /// Quality suggestions about the added evidence.
    pub suggestions: Vec<String>,
    pub segments_total: usize,
    pub segments_completed: usize,
    /// Set when a service failure cut extraction short.
    pub partial_failure: Option<PartialFailure>,
    pub trace: ReasoningTrace,
}

impl ExtractionResult {
    pub fn is_complete(&self) -> bool {
        self.partial_failure.is_none()
    }
}

/// Turns raw research text into typed evidence chunks.
#[derive(Clone)]
pub struct EvidenceExtractor {
    core: ModeCore,
    max_segment_chars: usize,
}

impl EvidenceExtractor {
    pub fn new(core: ModeCore, config: &EngineConfig) -> Self {
        Self {
            core,
            max_segment_chars: config.max_segment_chars,
        }
    }

    /// Extract chunks from `raw_text` into `store`.
    ///
    /// The store is only modified if the call succeeds; an unparsable
    /// service response leaves it untouched.
    pub async fn extract(
        &self,
        store: &mut EvidenceStore,
        raw_text: &str,
        source: Option<&str>,
    ) -> EngineResult<ExtractionResult> {
        let start = Instant::now();

        if raw_text.trim().is_empty() {
            return Err(EngineError::Validation {
                field: "text".to_string(),
                reason: "Raw text cannot be empty".to_string(),
            });
        }

        let source = source.map(str::trim).filter(|s| !s.is_empty());
        let segments = segment_text(raw_text, self.max_segment_chars);
        let mut working = store.clone();
        let mut trace = ReasoningTrace::new();
        let mut added = Vec::new();
        let mut duplicates = Vec::new();
        let mut rejected = 0;
        let mut segments_completed = 0;
        let mut partial_failure = None;

        trace.record(
            StepKind::Info,
            format!(
                "Split {} characters of input into {} segment(s)",
                raw_text.chars().count(),
                segments.len()
            ),
            Vec::<String>::new(),
        );

        for (index, segment) in segments.iter().enumerate() {
            debug!(segment = index + 1, chars = segment.len(), "Extracting segment");

            let request = ExtractionRequest {
                raw_text: segment.clone(),
                schema_description: EXTRACTION_SCHEMA.to_string(),
                source_hint: source.map(str::to_string),
            };

            let items = match self.core.extraction().extract(request).await {
                Ok(items) => items,
                Err(ServiceError::Parse { message }) => {
                    warn!(error = %message, segment = index + 1, "Extraction response unparsable");
                    return Err(EngineError::ExtractionParse {
                        message,
                        raw_text_preview: raw_text.chars().take(PREVIEW_CHARS).collect(),
                    });
                }
                Err(e) => {
                    let explanation = format!(
                        "extraction incomplete: {} chunks recovered from {} of {} segments",
                        added.len(),
                        segments_completed,
                        segments.len()
                    );
                    warn!(error = %e, recovered = added.len(), "{}", explanation);
                    trace.record(
                        StepKind::ServiceFailure,
                        format!("{}; {}", describe_service_error("extraction", &e), explanation),
                        added.iter().map(|c: &EvidenceChunk| c.id.clone()),
                    );
                    partial_failure = Some(PartialFailure::new("extraction", &e, explanation));
                    break;
                }
            };

            for item in &items {
                let chunk = match validate_item(item, source) {
                    Ok(chunk) => chunk,
                    Err(reason) => {
                        rejected += 1;
                        warn!(reason = %reason, "Discarding malformed chunk");
                        trace.record(
                            StepKind::Rejection,
                            format!("discarded malformed chunk: {}", reason),
                            Vec::<String>::new(),
                        );
                        continue;
                    }
                };

                let text = chunk.text.clone();
                match working.add(chunk) {
                    Ok(stored) => {
                        trace.record(
                            StepKind::Info,
                            format!("added {} chunk from '{}'", stored.evidence_type, stored.source),
                            [stored.id.clone()],
                        );
                        added.push(stored.clone());
                    }
                    Err(EngineError::DuplicateEvidence {
                        existing_id,
                        similarity,
                    }) => {
                        debug!(existing_id = %existing_id, similarity, "Skipping duplicate chunk");
                        trace.record(
                            StepKind::Duplicate,
                            format!(
                                "skipped duplicate: {:.2} similar to an existing chunk",
                                similarity
                            ),
                            [existing_id.clone()],
                        );
                        duplicates.push(DuplicateSkip {
                            text,
                            existing_id,
                            similarity,
                        });
                    }
                    Err(EngineError::Validation { reason, .. }) => {
                        rejected += 1;
                        trace.record(
                            StepKind::Rejection,
                            format!("discarded malformed chunk: {}", reason),
                            Vec::<String>::new(),
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
            segments_completed += 1;
        }

        let counts_by_type = count_by_type(added.iter());
        let suggestions = quality_suggestions(&added);

        trace.record(
            StepKind::Count,
            format!(
                "Added {} chunk(s), skipped {} duplicate(s), discarded {} malformed item(s)",
                added.len(),
                duplicates.len(),
                rejected
            ),
            added.iter().map(|c| c.id.clone()),
        );

        *store = working;

        info!(
            added = added.len(),
            duplicates = duplicates.len(),
            rejected,
            complete = partial_failure.is_none(),
            latency_ms = start.elapsed().as_millis(),
            "Extraction completed"
        );

        Ok(ExtractionResult {
            added,
            duplicates,
            rejected,
            counts_by_type,
            suggestions,
            segments_total: segments.len(),
            segments_completed,
            partial_failure,
            trace,
        })
    }
}

/// Validate one raw item and build a chunk from it.
///
/// Accepts `text` or `content` for the excerpt and `type` or `evidence_type`
/// for the type.
pub fn validate_item(item: &Value, source: Option<&str>) -> Result<EvidenceChunk, String> {
    let obj = item.as_object().ok_or_else(|| "not an object".to_string())?;

    let text = obj
        .get("text")
        .or_else(|| obj.get("content"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "missing text".to_string())?;

    let type_label = obj
        .get("type")
        .or_else(|| obj.get("evidence_type"))
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| "missing type".to_string())?;
    let evidence_type = type_label
        .parse::<EvidenceType>()
        .map_err(|_| format!("unknown type '{}'", type_label))?;

    let confidence = match obj.get("confidence") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let c = value
                .as_f64()
                .ok_or_else(|| "confidence is not a number".to_string())?;
            if !(0.0..=1.0).contains(&c) {
                return Err(format!("confidence {} outside 0-1", c));
            }
            Some(c)
        }
    };

    let strength = match obj.get("strength").and_then(Value::as_str) {
        None => None,
        Some(label) => Some(
            label
                .parse::<EvidenceStrength>()
                .map_err(|_| format!("unknown strength '{}'", label))?,
        ),
    };

    let item_source = obj
        .get("source")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let source = item_source.or(source).unwrap_or(UNATTRIBUTED_SOURCE);

    let tags = obj
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut chunk = EvidenceChunk::new(text, evidence_type, source)
        .map_err(|e| e.to_string())?
        .with_tags(tags);
    if let Some(strength) = strength {
        chunk = chunk.with_strength(strength);
    }
    if let Some(confidence) = confidence {
        chunk = chunk.with_extraction_confidence(confidence);
    }
    Ok(chunk)
}

/// Split text into paragraph-aligned segments of at most `max_chars` characters.
///
/// A paragraph longer than the limit is split on word boundaries.
pub fn segment_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut segments = Vec::new();
    let mut current = String::new();

    let paragraphs = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty());

    for paragraph in paragraphs {
        for piece in split_long(paragraph, max_chars) {
            let needed = if current.is_empty() {
                piece.chars().count()
            } else {
                current.chars().count() + 2 + piece.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn split_long(paragraph: &str, max_chars: usize) -> Vec<String> {
    if paragraph.chars().count() <= max_chars {
        return vec![paragraph.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if needed > max_chars && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Suggestions about the balance of freshly extracted evidence.
pub fn quality_suggestions(chunks: &[EvidenceChunk]) -> Vec<String> {
    let mut suggestions = Vec::new();
    if chunks.is_empty() {
        return suggestions;
    }

    let counts = count_by_type(chunks.iter());
    if counts.len() == 1 {
        if let Some(only) = counts.keys().next() {
            suggestions.push(format!(
                "All evidence is type '{}'. Consider gathering other evidence types for stronger validation.",
                only
            ));
        }
    }

    let weak = chunks
        .iter()
        .filter(|c| c.strength == Some(EvidenceStrength::Weak))
        .count();
    let strong = chunks
        .iter()
        .filter(|c| c.strength == Some(EvidenceStrength::Strong))
        .count();
    if weak > strong {
        suggestions.push(
            "More weak evidence than strong. Consider gathering more direct evidence.".to_string(),
        );
    }

    if chunks.len() < 5 {
        suggestions.push("Small evidence base. Conclusions may not be well-supported.".to_string());
    }

    suggestions
}
