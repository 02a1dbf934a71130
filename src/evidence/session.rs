use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{normalize_statement, EvidenceStore, Hypothesis, Verdict};
use crate::error::EngineResult;
use crate::modes::Intent;

/// In-memory projection of one session.
///
/// The engine receives a `Session`, works on its own copy and hands back the
/// updated projection. Verdict history is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub evidence: EvidenceStore,
    #[serde(default)]
    pub hypotheses: Vec<Hypothesis>,
    #[serde(default)]
    verdicts: Vec<Verdict>,
    /// Intent of the previous pipeline run, used to disambiguate the next one.
    #[serde(default)]
    pub last_intent: Option<Intent>,
}

/// What the intent classifier is told about the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionContext {
    pub chunk_count: usize,
    pub hypothesis_count: usize,
    pub latest_hypothesis: Option<String>,
    pub previous_intent: Option<Intent>,
}

impl SessionContext {
    pub fn has_evidence(&self) -> bool {
        self.chunk_count > 0
    }

    pub fn has_hypotheses(&self) -> bool {
        self.hypothesis_count > 0
    }

    /// One-paragraph summary sent alongside the utterance.
    pub fn describe(&self) -> String {
        let mut summary = format!(
            "Session holds {} evidence chunk(s) and {} hypothesis(es).",
            self.chunk_count, self.hypothesis_count
        );
        if let Some(statement) = &self.latest_hypothesis {
            summary.push_str(&format!(" Latest hypothesis: \"{}\".", statement));
        }
        if let Some(intent) = self.previous_intent {
            summary.push_str(&format!(" Previous action: {}.", intent));
        }
        summary
    }
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: None,
            created_at: now,
            updated_at: now,
            evidence: EvidenceStore::new(),
            hypotheses: Vec::new(),
            verdicts: Vec::new(),
            last_intent: None,
        }
    }

    /// Set a display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Register a hypothesis, reusing an existing record with the same
    /// normalized statement.
    pub fn register_hypothesis(&mut self, statement: &str) -> EngineResult<&Hypothesis> {
        let normalized = normalize_statement(statement);
        if let Some(pos) = self
            .hypotheses
            .iter()
            .position(|h| h.statement.eq_ignore_ascii_case(&normalized))
        {
            return Ok(&self.hypotheses[pos]);
        }

        let hypothesis = Hypothesis::new(&normalized)?;
        Ok(self.push_hypothesis(hypothesis))
    }

    /// Store an already-built hypothesis, reusing a matching record if present.
    pub fn add_hypothesis(&mut self, hypothesis: Hypothesis) -> &Hypothesis {
        if let Some(pos) = self
            .hypotheses
            .iter()
            .position(|h| h.statement.eq_ignore_ascii_case(&hypothesis.statement))
        {
            return &self.hypotheses[pos];
        }
        self.push_hypothesis(hypothesis)
    }

    fn push_hypothesis(&mut self, hypothesis: Hypothesis) -> &Hypothesis {
        self.hypotheses.push(hypothesis);
        self.touch();
        let last = self.hypotheses.len() - 1;
        &self.hypotheses[last]
    }

    pub fn hypothesis(&self, id: &str) -> Option<&Hypothesis> {
        self.hypotheses.iter().find(|h| h.id == id)
    }

    pub fn latest_hypothesis(&self) -> Option<&Hypothesis> {
        self.hypotheses.last()
    }

    /// Append a verdict to the history.
    pub fn record_verdict(&mut self, verdict: Verdict) -> &Verdict {
        self.verdicts.push(verdict);
        self.touch();
        let last = self.verdicts.len() - 1;
        &self.verdicts[last]
    }

    /// Full verdict history, oldest first.
    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    pub fn latest_verdict(&self) -> Option<&Verdict> {
        self.verdicts.last()
    }

    /// Verdicts for one hypothesis, oldest first.
    pub fn verdicts_for<'a>(&'a self, hypothesis_id: &'a str) -> impl Iterator<Item = &'a Verdict> {
        self.verdicts
            .iter()
            .filter(move |v| v.hypothesis_id == hypothesis_id)
    }

    pub fn context_summary(&self) -> SessionContext {
        SessionContext {
            chunk_count: self.evidence.current().count(),
            hypothesis_count: self.hypotheses.len(),
            latest_hypothesis: self.latest_hypothesis().map(|h| h.statement.clone()),
            previous_intent: self.last_intent,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{CounterSearch, EvidenceChunk, EvidenceType, VerdictKind};
    use crate::trace::ReasoningTrace;

    fn verdict_for(hypothesis_id: &str) -> Verdict {
        Verdict {
            id: uuid::Uuid::new_v4().to_string(),
            hypothesis_id: hypothesis_id.to_string(),
            verdict_kind: VerdictKind::InsufficientEvidence,
            confidence: 0.0,
            supporting_weight: 0.0,
            counter_weight: 0.0,
            supporting_chunk_ids: vec![],
            counter_chunk_ids: vec![],
            counter_search: CounterSearch::default(),
            trace: ReasoningTrace::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_register_hypothesis_reuses_statement() {
        let mut session = Session::new();
        let first = session
            .register_hypothesis("Onboarding is too long.")
            .unwrap()
            .id
            .clone();
        let second = session
            .register_hypothesis("  onboarding is too long ")
            .unwrap()
            .id
            .clone();
        assert_eq!(first, second);
        assert_eq!(session.hypotheses.len(), 1);
    }

    #[test]
    fn test_register_hypothesis_rejects_empty() {
        let mut session = Session::new();
        assert!(session.register_hypothesis("   ").is_err());
        assert!(session.hypotheses.is_empty());
    }

    #[test]
    fn test_verdict_history_is_append_only() {
        let mut session = Session::new();
        let id = session.register_hypothesis("Pricing confuses users").unwrap().id.clone();
        session.record_verdict(verdict_for(&id));
        session.record_verdict(verdict_for(&id));
        session.record_verdict(verdict_for("other"));

        assert_eq!(session.verdicts().len(), 3);
        assert_eq!(session.verdicts_for(&id).count(), 2);
        assert_eq!(session.latest_verdict().unwrap().hypothesis_id, "other");
    }

    #[test]
    fn test_context_summary() {
        let mut session = Session::new();
        session
            .evidence
            .add(EvidenceChunk::new("It crashed", EvidenceType::SupportTicket, "T-1").unwrap())
            .unwrap();
        session.register_hypothesis("The app is unstable").unwrap();
        session.last_intent = Some(Intent::Extract);

        let context = session.context_summary();
        assert!(context.has_evidence());
        assert!(context.has_hypotheses());
        assert_eq!(context.latest_hypothesis.as_deref(), Some("The app is unstable"));
        let description = context.describe();
        assert!(description.contains("1 evidence chunk(s)"));
        assert!(description.contains("Previous action: extract"));
    }

    #[test]
    fn test_session_serde_round_trip() {
        let mut session = Session::new().with_title("Q3 research");
        let id = session.register_hypothesis("Search is slow").unwrap().id.clone();
        session.record_verdict(verdict_for(&id));

        let json = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, session);
    }
}
