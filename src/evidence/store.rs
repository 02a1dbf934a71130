use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EvidenceChunk, EvidenceType};
use crate::error::{EngineError, EngineResult};

/// Default similarity at or above which two excerpts are near-duplicates.
pub const DEFAULT_DUPLICATE_SIMILARITY: f64 = 0.9;

fn default_duplicate_similarity() -> f64 {
    DEFAULT_DUPLICATE_SIMILARITY
}

/// All evidence chunks of one session, in insertion order.
///
/// Chunks are never removed or modified. Insertion order is the tie-break
/// used by every component that reads the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceStore {
    chunks: Vec<EvidenceChunk>,
    #[serde(default = "default_duplicate_similarity")]
    duplicate_similarity: f64,
}

impl Default for EvidenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceStore {
    /// Create an empty store with the default near-duplicate threshold.
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            duplicate_similarity: DEFAULT_DUPLICATE_SIMILARITY,
        }
    }

    /// Create an empty store with a custom near-duplicate threshold.
    pub fn with_duplicate_similarity(threshold: f64) -> Self {
        Self {
            chunks: Vec::new(),
            duplicate_similarity: threshold,
        }
    }

    /// Change the near-duplicate threshold for subsequent additions.
    pub fn set_duplicate_similarity(&mut self, threshold: f64) {
        self.duplicate_similarity = threshold;
    }

    /// Add a chunk.
    ///
    /// Fails with [`EngineError::DuplicateEvidence`] if a stored chunk is at
    /// least as similar as the configured threshold.
    pub fn add(&mut self, chunk: EvidenceChunk) -> EngineResult<&EvidenceChunk> {
        self.check_invariants(&chunk)?;

        if let Some((existing, similarity)) =
            self.find_near_duplicate(&chunk.text, chunk.corrects.as_deref())
        {
            return Err(EngineError::DuplicateEvidence {
                existing_id: existing.id.clone(),
                similarity,
            });
        }

        debug!(
            chunk_id = %chunk.id,
            evidence_type = %chunk.evidence_type,
            "Evidence chunk stored"
        );
        self.chunks.push(chunk);
        let last = self.chunks.len() - 1;
        Ok(&self.chunks[last])
    }

    /// Store a correction of an existing chunk as a new chunk.
    ///
    /// The original stays in the store but drops out of [`current`](Self::current).
    pub fn correct(
        &mut self,
        original_id: &str,
        text: impl Into<String>,
        source: Option<String>,
    ) -> EngineResult<&EvidenceChunk> {
        let original = self.get(original_id).ok_or_else(|| EngineError::Validation {
            field: "original_id".to_string(),
            reason: format!("No evidence chunk with id {}", original_id),
        })?;

        if self.is_superseded(original_id) {
            return Err(EngineError::Validation {
                field: "original_id".to_string(),
                reason: format!("Evidence chunk {} has already been corrected", original_id),
            });
        }

        let mut correction = EvidenceChunk::new(
            text,
            original.evidence_type,
            source.unwrap_or_else(|| original.source.clone()),
        )?
        .with_tags(original.tags.clone());
        correction.corrects = Some(original_id.to_string());

        self.add(correction)
    }

    /// Look up a chunk by id.
    pub fn get(&self, id: &str) -> Option<&EvidenceChunk> {
        self.chunks.iter().find(|c| c.id == id)
    }

    /// Whether a chunk with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Every chunk ever stored, in insertion order.
    pub fn all(&self) -> &[EvidenceChunk] {
        &self.chunks
    }

    /// Chunks not superseded by a correction, in insertion order.
    pub fn current(&self) -> impl Iterator<Item = &EvidenceChunk> + '_ {
        let superseded = self.superseded_ids();
        self.chunks
            .iter()
            .filter(move |c| !superseded.contains(c.id.as_str()))
    }

    /// Lazily filter the store. The returned query can be iterated any number of times.
    pub fn query(&self, filter: EvidenceFilter) -> ChunkQuery<'_> {
        ChunkQuery {
            chunks: &self.chunks,
            superseded: self.superseded_ids(),
            filter,
        }
    }

    /// Number of stored chunks, superseded ones included.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Count of current chunks per evidence type.
    pub fn counts_by_type(&self) -> BTreeMap<EvidenceType, usize> {
        count_by_type(self.current())
    }

    /// The most similar stored chunk at or above the threshold, if any.
    ///
    /// `ignore` names a chunk excluded from comparison (the one being corrected).
    pub fn find_near_duplicate(
        &self,
        text: &str,
        ignore: Option<&str>,
    ) -> Option<(&EvidenceChunk, f64)> {
        self.chunks
            .iter()
            .filter(|c| Some(c.id.as_str()) != ignore)
            .map(|c| (c, text_similarity(&c.text, text)))
            .filter(|(_, similarity)| *similarity >= self.duplicate_similarity)
            .fold(None, |best: Option<(&EvidenceChunk, f64)>, candidate| match best {
                Some(b) if b.1 >= candidate.1 => Some(b),
                _ => Some(candidate),
            })
    }

    fn is_superseded(&self, id: &str) -> bool {
        self.chunks
            .iter()
            .any(|c| c.corrects.as_deref() == Some(id))
    }

    fn superseded_ids(&self) -> HashSet<&str> {
        self.chunks
            .iter()
            .filter_map(|c| c.corrects.as_deref())
            .collect()
    }

    fn check_invariants(&self, chunk: &EvidenceChunk) -> EngineResult<()> {
        if chunk.text.trim().is_empty() {
            return Err(EngineError::Validation {
                field: "text".to_string(),
                reason: "Evidence text cannot be empty".to_string(),
            });
        }
        if self.contains(&chunk.id) {
            return Err(EngineError::Validation {
                field: "id".to_string(),
                reason: format!("Evidence chunk {} already stored", chunk.id),
            });
        }
        if let Some(confidence) = chunk.extraction_confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(EngineError::Validation {
                    field: "extraction_confidence".to_string(),
                    reason: format!("Confidence {} outside 0-1", confidence),
                });
            }
        }
        Ok(())
    }
}

/// Count chunks per evidence type.
pub fn count_by_type<'a>(
    chunks: impl IntoIterator<Item = &'a EvidenceChunk>,
) -> BTreeMap<EvidenceType, usize> {
    let mut counts = BTreeMap::new();
    for chunk in chunks {
        *counts.entry(chunk.evidence_type).or_insert(0) += 1;
    }
    counts
}

/// Predicates for [`EvidenceStore::query`]. Unset predicates match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceFilter {
    /// Accepted types; empty accepts all.
    pub evidence_types: Vec<EvidenceType>,
    /// Case-insensitive substring of the source label.
    pub source: Option<String>,
    /// Case-insensitive substring of the excerpt.
    pub text_contains: Option<String>,
    /// Whether chunks replaced by a correction are returned.
    pub include_superseded: bool,
}

impl EvidenceFilter {
    /// Filter matching every current chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept chunks of this type (may be called repeatedly).
    pub fn of_type(mut self, evidence_type: EvidenceType) -> Self {
        self.evidence_types.push(evidence_type);
        self
    }

    /// Accept chunks whose source contains this label.
    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into().to_lowercase());
        self
    }

    /// Accept chunks whose text contains this fragment.
    pub fn containing(mut self, fragment: impl Into<String>) -> Self {
        self.text_contains = Some(fragment.into().to_lowercase());
        self
    }

    /// Also return superseded chunks.
    pub fn including_superseded(mut self) -> Self {
        self.include_superseded = true;
        self
    }

    fn matches(&self, chunk: &EvidenceChunk) -> bool {
        if !self.evidence_types.is_empty() && !self.evidence_types.contains(&chunk.evidence_type) {
            return false;
        }
        if let Some(source) = &self.source {
            if !chunk.source.to_lowercase().contains(source.as_str()) {
                return false;
            }
        }
        if let Some(fragment) = &self.text_contains {
            if !chunk.text.to_lowercase().contains(fragment.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A restartable, lazily evaluated view over matching chunks.
#[derive(Debug, Clone)]
pub struct ChunkQuery<'a> {
    chunks: &'a [EvidenceChunk],
    superseded: HashSet<&'a str>,
    filter: EvidenceFilter,
}

impl<'a> ChunkQuery<'a> {
    /// Start a fresh pass over the matching chunks.
    pub fn iter(&self) -> impl Iterator<Item = &'a EvidenceChunk> + '_ {
        self.chunks.iter().filter(move |c| {
            (self.filter.include_superseded || !self.superseded.contains(c.id.as_str()))
                && self.filter.matches(c)
        })
    }

    /// Number of matching chunks.
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Whether nothing matches.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Similarity of two excerpts in [0, 1].
///
/// Identical normalized text scores 1.0; otherwise the Sørensen-Dice
/// coefficient over character bigrams of the normalized text.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_for_comparison(a);
    let b = normalize_for_comparison(b);

    if a == b {
        return if a.is_empty() { 0.0 } else { 1.0 };
    }

    let bigrams_a = bigrams(&a);
    let bigrams_b = bigrams(&b);
    if bigrams_a.is_empty() || bigrams_b.is_empty() {
        return 0.0;
    }

    // Multiset intersection
    let mut remaining = bigrams_b.clone();
    let mut shared = 0usize;
    for pair in &bigrams_a {
        if let Some(pos) = remaining.iter().position(|p| p == pair) {
            remaining.swap_remove(pos);
            shared += 1;
        }
    }

    (2.0 * shared as f64) / (bigrams_a.len() + bigrams_b.len()) as f64
}

fn normalize_for_comparison(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn bigrams(text: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, evidence_type: EvidenceType, source: &str) -> EvidenceChunk {
        EvidenceChunk::new(text, evidence_type, source).unwrap()
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let mut store = EvidenceStore::new();
        store
            .add(chunk("Setup took me an hour", EvidenceType::UserQuote, "Int 1"))
            .unwrap();
        store
            .add(chunk("40% abandon at step two", EvidenceType::AnalyticsData, "Dash"))
            .unwrap();

        let texts: Vec<&str> = store.all().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Setup took me an hour", "40% abandon at step two"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_add_rejects_exact_duplicate() {
        let mut store = EvidenceStore::new();
        let first_id = store
            .add(chunk("The export button is hidden", EvidenceType::UserQuote, "A"))
            .unwrap()
            .id
            .clone();

        let err = store
            .add(chunk("The export button is hidden.", EvidenceType::UserQuote, "B"))
            .unwrap_err();
        match err {
            EngineError::DuplicateEvidence {
                existing_id,
                similarity,
            } => {
                assert_eq!(existing_id, first_id);
                assert_eq!(similarity, 1.0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_rejects_near_duplicate() {
        let mut store = EvidenceStore::new();
        store
            .add(chunk(
                "I could never find where the export settings live in the app",
                EvidenceType::UserQuote,
                "A",
            ))
            .unwrap();

        let result = store.add(chunk(
            "I could never find where the export setting lives in the app",
            EvidenceType::UserQuote,
            "A",
        ));
        assert!(matches!(result, Err(EngineError::DuplicateEvidence { .. })));
    }

    #[test]
    fn test_add_accepts_distinct_text() {
        let mut store = EvidenceStore::new();
        store
            .add(chunk("Pricing page confused me", EvidenceType::UserQuote, "A"))
            .unwrap();
        assert!(store
            .add(chunk("Onboarding emails were helpful", EvidenceType::UserQuote, "A"))
            .is_ok());
    }

    #[test]
    fn test_custom_threshold() {
        let mut store = EvidenceStore::with_duplicate_similarity(1.0);
        store
            .add(chunk("the export settings are hidden", EvidenceType::UserQuote, "A"))
            .unwrap();
        assert!(store
            .add(chunk("the export setting is hidden", EvidenceType::UserQuote, "A"))
            .is_ok());
    }

    #[test]
    fn test_query_filters_and_restarts() {
        let mut store = EvidenceStore::new();
        store
            .add(chunk("Churned after trial ended", EvidenceType::BehavioralObservation, "Mixpanel"))
            .unwrap();
        store
            .add(chunk("Trial felt too short", EvidenceType::UserQuote, "Interview - Sam"))
            .unwrap();
        store
            .add(chunk("Asked for longer trial", EvidenceType::SupportTicket, "Zendesk"))
            .unwrap();

        let query = store.query(EvidenceFilter::new().containing("TRIAL").of_type(EvidenceType::UserQuote));
        assert_eq!(query.count(), 1);
        // restartable
        let first: Vec<_> = query.iter().map(|c| c.id.clone()).collect();
        let second: Vec<_> = query.iter().map(|c| c.id.clone()).collect();
        assert_eq!(first, second);

        let by_source = store.query(EvidenceFilter::new().from_source("zendesk"));
        assert_eq!(by_source.iter().next().unwrap().text, "Asked for longer trial");

        assert_eq!(store.query(EvidenceFilter::new()).count(), 3);
        assert!(store
            .query(EvidenceFilter::new().containing("pricing"))
            .is_empty());
    }

    #[test]
    fn test_correct_is_additive() {
        let mut store = EvidenceStore::new();
        let original_id = store
            .add(chunk("Users wait 5 minutes for sync", EvidenceType::AnalyticsData, "Grafana"))
            .unwrap()
            .id
            .clone();

        let correction = store
            .correct(&original_id, "Users wait 5 seconds for sync", None)
            .unwrap();
        assert_eq!(correction.corrects.as_deref(), Some(original_id.as_str()));
        assert_eq!(correction.source, "Grafana");
        assert_eq!(correction.evidence_type, EvidenceType::AnalyticsData);

        assert_eq!(store.len(), 2);
        let current: Vec<_> = store.current().map(|c| c.text.as_str()).collect();
        assert_eq!(current, vec!["Users wait 5 seconds for sync"]);
        assert!(store.get(&original_id).is_some());

        let everything = store.query(EvidenceFilter::new().including_superseded());
        assert_eq!(everything.count(), 2);
    }

    #[test]
    fn test_correct_twice_fails() {
        let mut store = EvidenceStore::new();
        let id = store
            .add(chunk("Sync is slow", EvidenceType::UserQuote, "A"))
            .unwrap()
            .id
            .clone();
        store.correct(&id, "Sync is slow on mobile", None).unwrap();
        let err = store.correct(&id, "Sync is slow on tablets", None).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn test_correct_unknown_id() {
        let mut store = EvidenceStore::new();
        assert!(store.correct("missing", "text", None).is_err());
    }

    #[test]
    fn test_counts_by_type() {
        let mut store = EvidenceStore::new();
        store.add(chunk("quote one here", EvidenceType::UserQuote, "A")).unwrap();
        store.add(chunk("another quote entirely", EvidenceType::UserQuote, "B")).unwrap();
        store.add(chunk("12% conversion", EvidenceType::AnalyticsData, "C")).unwrap();

        let counts = store.counts_by_type();
        assert_eq!(counts.get(&EvidenceType::UserQuote), Some(&2));
        assert_eq!(counts.get(&EvidenceType::AnalyticsData), Some(&1));
        assert_eq!(counts.get(&EvidenceType::SupportTicket), None);
    }

    #[test]
    fn test_text_similarity_bounds() {
        assert_eq!(text_similarity("abc def", "ABC, def!"), 1.0);
        assert_eq!(text_similarity("", ""), 0.0);
        assert_eq!(text_similarity("a", "b"), 0.0);
        let s = text_similarity("night", "nacht");
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn test_store_serde_round_trip_keeps_threshold() {
        let mut store = EvidenceStore::with_duplicate_similarity(0.8);
        store.add(chunk("kept", EvidenceType::UserQuote, "A")).unwrap();
        let json = serde_json::to_string(&store).unwrap();
        let restored: EvidenceStore = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, store);
    }
}
