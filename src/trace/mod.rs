//! Reasoning traces.
//!
//! Every component appends [`TraceStep`]s while it works; the resulting
//! [`ReasoningTrace`] is attached to exactly one verdict, pattern set or
//! report and rendered as a bullet list for audit.

use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceStore;

/// What a trace step records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// General progress or context.
    Info,
    /// Counts of chunks considered.
    Count,
    /// A single chunk's weight contribution.
    Contribution,
    /// A threshold comparison that decided an outcome.
    Threshold,
    /// An extracted item dropped by validation.
    Rejection,
    /// An item skipped as a near-duplicate.
    Duplicate,
    /// The explicit search for counter-evidence.
    CounterSearch,
    /// An external service call that failed.
    ServiceFailure,
    /// A coverage gap.
    Gap,
    /// A conclusion drawn from earlier steps.
    Finding,
}

impl StepKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Info => "info",
            StepKind::Count => "count",
            StepKind::Contribution => "contribution",
            StepKind::Threshold => "threshold",
            StepKind::Rejection => "rejection",
            StepKind::Duplicate => "duplicate",
            StepKind::CounterSearch => "counter_search",
            StepKind::ServiceFailure => "service_failure",
            StepKind::Gap => "gap",
            StepKind::Finding => "finding",
        }
    }
}

/// One entry of a reasoning trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Step category.
    pub kind: StepKind,
    /// Human-readable description.
    pub description: String,
    /// Evidence the step relied on.
    #[serde(default)]
    pub chunk_ids: Vec<String>,
}

impl TraceStep {
    /// Create a step referencing no evidence.
    pub fn new(kind: StepKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            chunk_ids: Vec::new(),
        }
    }

    /// Attach referenced chunk ids.
    pub fn with_chunks<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chunk_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered, append-only sequence of trace steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    steps: Vec<TraceStep>,
}

impl ReasoningTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step and return its index.
    pub fn push(&mut self, step: TraceStep) -> usize {
        self.steps.push(step);
        self.steps.len() - 1
    }

    /// Append a step built from its parts and return its index.
    pub fn record<I, S>(&mut self, kind: StepKind, description: impl Into<String>, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(TraceStep::new(kind, description).with_chunks(ids))
    }

    /// Append every step of another trace, returning the index range they occupy.
    pub fn append(&mut self, other: &ReasoningTrace) -> std::ops::Range<usize> {
        let start = self.steps.len();
        self.steps.extend(other.steps.iter().cloned());
        start..self.steps.len()
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&TraceStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps of one kind, in order.
    pub fn of_kind(&self, kind: StepKind) -> impl Iterator<Item = &TraceStep> + '_ {
        self.steps.iter().filter(move |s| s.kind == kind)
    }

    /// Every chunk id referenced anywhere in the trace, first occurrence order.
    pub fn referenced_chunk_ids(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for id in self.steps.iter().flat_map(|s| s.chunk_ids.iter()) {
            if !seen.contains(&id.as_str()) {
                seen.push(id.as_str());
            }
        }
        seen
    }

    /// Referenced chunk ids that the store does not contain.
    pub fn unknown_references<'a>(&'a self, store: &EvidenceStore) -> Vec<&'a str> {
        self.referenced_chunk_ids()
            .into_iter()
            .filter(|id| !store.contains(id))
            .collect()
    }

    /// Render as a numbered bullet list, one line per step.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!("- [{}] {}", i + 1, step.description));
            if !step.chunk_ids.is_empty() {
                out.push_str(&format!(" (evidence: {})", step.chunk_ids.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Display for ReasoningTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{EvidenceChunk, EvidenceType};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_returns_indices_in_order() {
        let mut trace = ReasoningTrace::new();
        let first = trace.push(TraceStep::new(StepKind::Info, "start"));
        let second = trace.record(StepKind::Count, "2 chunks", ["a", "b"]);
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.get(1).unwrap().chunk_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_render_lists_steps_with_evidence() {
        let mut trace = ReasoningTrace::new();
        trace.record(StepKind::Count, "Retrieved 2 relevant chunks", ["c1", "c2"]);
        trace.push(TraceStep::new(StepKind::Threshold, "0.61 < 0.75"));

        assert_eq!(
            trace.render(),
            "- [1] Retrieved 2 relevant chunks (evidence: c1, c2)\n- [2] 0.61 < 0.75\n"
        );
    }

    #[test]
    fn test_append_reports_range() {
        let mut a = ReasoningTrace::new();
        a.push(TraceStep::new(StepKind::Info, "one"));
        let mut b = ReasoningTrace::new();
        b.push(TraceStep::new(StepKind::Info, "two"));
        b.push(TraceStep::new(StepKind::Info, "three"));

        let range = a.append(&b);
        assert_eq!(range, 1..3);
        assert_eq!(a.steps()[2].description, "three");
    }

    #[test]
    fn test_referenced_ids_dedup_and_unknown() {
        let mut store = EvidenceStore::new();
        let id = store
            .add(EvidenceChunk::new("real chunk", EvidenceType::UserQuote, "A").unwrap())
            .unwrap()
            .id
            .clone();

        let mut trace = ReasoningTrace::new();
        trace.record(StepKind::Info, "x", [id.clone(), "ghost".to_string()]);
        trace.record(StepKind::Info, "y", [id.clone()]);

        assert_eq!(trace.referenced_chunk_ids(), vec![id.as_str(), "ghost"]);
        assert_eq!(trace.unknown_references(&store), vec!["ghost"]);
    }

    #[test]
    fn test_of_kind_filters() {
        let mut trace = ReasoningTrace::new();
        trace.push(TraceStep::new(StepKind::Rejection, "discarded malformed chunk: missing type"));
        trace.push(TraceStep::new(StepKind::Info, "ok"));
        assert_eq!(trace.of_kind(StepKind::Rejection).count(), 1);
    }
}
