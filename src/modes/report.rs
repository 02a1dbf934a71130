//! Stakeholder reports.
//!
//! Deterministic formatting over an already computed verdict or pattern set.
//! Every field carries the indices of the report-trace steps that justify it.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use serde::Serialize;
use tracing::info;

use super::{confidence_level, detect_gaps, Gap, PatternSet};
use crate::config::EngineConfig;
use crate::evidence::{EvidenceChunk, EvidenceStore, EvidenceType, Hypothesis, Verdict, VerdictKind};
use crate::trace::{ReasoningTrace, StepKind};

/// A piece of report text and the trace steps behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportField {
    pub text: String,
    /// Indices into the report trace.
    pub trace_steps: Vec<usize>,
}

impl ReportField {
    fn new(text: impl Into<String>, trace_steps: Vec<usize>) -> Self {
        Self {
            text: text.into(),
            trace_steps,
        }
    }

    fn step_refs(&self) -> String {
        let refs: Vec<String> = self.trace_steps.iter().map(|i| (i + 1).to_string()).collect();
        format!("[trace {}]", refs.join(", "))
    }
}

/// What a report is about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportSubject {
    Verdict {
        hypothesis: String,
        verdict_id: String,
        verdict_kind: VerdictKind,
    },
    Patterns {
        pattern_count: usize,
    },
}

/// Fixed-section report for stakeholders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakeholderReport {
    pub subject: ReportSubject,
    pub headline: ReportField,
    pub evidence_base: ReportField,
    pub counts_by_type: BTreeMap<EvidenceType, usize>,
    pub key_findings: Vec<ReportField>,
    pub confidence: ReportField,
    pub caveats: Vec<ReportField>,
    pub next_steps: Vec<ReportField>,
    pub trace: ReasoningTrace,
}

impl StakeholderReport {
    /// Every field with a stable name, in section order.
    pub fn fields(&self) -> Vec<(String, &ReportField)> {
        let mut fields = vec![
            ("headline".to_string(), &self.headline),
            ("evidence_base".to_string(), &self.evidence_base),
        ];
        fields.extend(
            self.key_findings
                .iter()
                .enumerate()
                .map(|(i, f)| (format!("key_findings[{}]", i), f)),
        );
        fields.push(("confidence".to_string(), &self.confidence));
        fields.extend(
            self.caveats
                .iter()
                .enumerate()
                .map(|(i, f)| (format!("caveats[{}]", i), f)),
        );
        fields.extend(
            self.next_steps
                .iter()
                .enumerate()
                .map(|(i, f)| (format!("next_steps[{}]", i), f)),
        );
        fields
    }

    /// Names of fields that reference no valid trace step.
    pub fn untraced_fields(&self) -> Vec<String> {
        self.fields()
            .into_iter()
            .filter(|(_, field)| {
                field.trace_steps.is_empty()
                    || field.trace_steps.iter().any(|i| self.trace.get(*i).is_none())
            })
            .map(|(name, _)| name)
            .collect()
    }

    /// Render the fixed section order as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::from("# Stakeholder Report\n\n");

        md.push_str("## Headline\n\n");
        md.push_str(&format!("{} {}\n\n", self.headline.text, self.headline.step_refs()));

        md.push_str("## Evidence Base\n\n");
        md.push_str(&format!("{} {}\n\n", self.evidence_base.text, self.evidence_base.step_refs()));
        for (evidence_type, count) in &self.counts_by_type {
            md.push_str(&format!("- {}: {}\n", evidence_type, count));
        }
        if !self.counts_by_type.is_empty() {
            md.push('\n');
        }

        md.push_str("## Key Findings\n\n");
        for finding in &self.key_findings {
            md.push_str(&format!("- {} {}\n", finding.text, finding.step_refs()));
        }

        md.push_str("\n## Confidence\n\n");
        md.push_str(&format!("{} {}\n\n", self.confidence.text, self.confidence.step_refs()));

        md.push_str("## Caveats & Gaps\n\n");
        for caveat in &self.caveats {
            md.push_str(&format!("- {} {}\n", caveat.text, caveat.step_refs()));
        }

        md.push_str("\n## Recommended Next Steps\n\n");
        for (i, step) in self.next_steps.iter().enumerate() {
            md.push_str(&format!("{}. {} {}\n", i + 1, step.text, step.step_refs()));
        }

        md.push_str("\n## Reasoning Trace\n\n");
        md.push_str(&self.trace.render());
        md
    }
}

fn next_steps_for(kind: VerdictKind) -> [&'static str; 2] {
    match kind {
        VerdictKind::Supported => [
            "Treat the hypothesis as supported by current evidence and move on to exploring solutions",
            "Keep collecting evidence and re-test if new counter-evidence appears",
        ],
        VerdictKind::PartiallySupported => [
            "Investigate the counter-evidence before committing to the hypothesis",
            "Gather the evidence types listed under caveats to resolve the mixed signal",
        ],
        VerdictKind::Contradicted => [
            "Revisit the hypothesis: current evidence points the other way",
            "Examine the counter-evidence for an alternative explanation worth testing",
        ],
        VerdictKind::InsufficientEvidence => [
            "Collect more evidence before making a decision on this hypothesis",
            "Prioritise the missing evidence types listed under caveats",
        ],
    }
}

fn headline_phrase(kind: VerdictKind) -> &'static str {
    match kind {
        VerdictKind::Supported => "supported by the evidence",
        VerdictKind::PartiallySupported => "partially supported; the evidence is mixed",
        VerdictKind::Contradicted => "contradicted by the evidence",
        VerdictKind::InsufficientEvidence => "not yet testable; there is not enough evidence",
    }
}

/// Index of the last step of `kind` within `range` whose description starts with `prefix`.
fn find_step(trace: &ReasoningTrace, range: &Range<usize>, kind: StepKind, prefix: &str) -> Option<usize> {
    range
        .clone()
        .rev()
        .find(|i| {
            trace
                .get(*i)
                .map(|s| s.kind == kind && s.description.starts_with(prefix))
                .unwrap_or(false)
        })
}

fn ids(chunks: &[&EvidenceChunk]) -> Vec<String> {
    chunks.iter().map(|c| c.id.clone()).collect()
}

fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.to_string()
    } else {
        format!("{}...", words[..max_words].join(" "))
    }
}

/// Builds stakeholder reports.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    config: EngineConfig,
}

impl ReportGenerator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Report on one verdict.
    pub fn for_verdict(
        &self,
        verdict: &Verdict,
        hypothesis: &Hypothesis,
        store: &EvidenceStore,
    ) -> StakeholderReport {
        let current: Vec<&EvidenceChunk> = store.current().collect();
        let examined = ids(&current);
        let mut trace = ReasoningTrace::new();
        let verdict_range = trace.append(&verdict.trace);

        let (evidence_base, counts_by_type) = self.evidence_base(&current, &mut trace);

        let relevant: Vec<String> = verdict
            .supporting_chunk_ids
            .iter()
            .chain(verdict.counter_chunk_ids.iter())
            .cloned()
            .collect();
        let relevant_or_examined = if relevant.is_empty() {
            examined.clone()
        } else {
            relevant.clone()
        };
        let verdict_step = find_step(&trace, &verdict_range, StepKind::Threshold, "Verdict ");
        let score_step = find_step(&trace, &verdict_range, StepKind::Finding, "Confidence ");
        let search_step = find_step(&trace, &verdict_range, StepKind::CounterSearch, "")
            .or_else(|| find_step(&trace, &verdict_range, StepKind::ServiceFailure, "Counter-evidence"));

        // Headline
        let headline_step = trace.record(
            StepKind::Finding,
            format!(
                "Headline from verdict {} at confidence {:.2}",
                verdict.verdict_kind, verdict.confidence
            ),
            relevant_or_examined.clone(),
        );
        let headline = ReportField::new(
            format!(
                "\"{}\" is {} (confidence {:.2}).",
                hypothesis.statement,
                headline_phrase(verdict.verdict_kind),
                verdict.confidence
            ),
            [Some(headline_step), verdict_step].into_iter().flatten().collect(),
        );

        // Key findings
        let mut key_findings = Vec::new();
        if !verdict.supporting_chunk_ids.is_empty() {
            let step = trace.record(
                StepKind::Finding,
                format!(
                    "{} supporting chunk(s), total weight {:.2}",
                    verdict.supporting_chunk_ids.len(),
                    verdict.supporting_weight
                ),
                verdict.supporting_chunk_ids.clone(),
            );
            key_findings.push(ReportField::new(
                format!(
                    "{} piece(s) of evidence support the hypothesis (weight {:.2}).",
                    verdict.supporting_chunk_ids.len(),
                    verdict.supporting_weight
                ),
                vec![step],
            ));

            if let Some(strongest) = self.strongest(&verdict.supporting_chunk_ids, store) {
                let step = trace.record(
                    StepKind::Finding,
                    format!("Strongest supporting chunk is {}", strongest.evidence_type),
                    [strongest.id.clone()],
                );
                key_findings.push(ReportField::new(
                    format!(
                        "Strongest support: \"{}\" ({}, {}).",
                        truncate_words(&strongest.text, 25),
                        strongest.evidence_type,
                        strongest.source
                    ),
                    vec![step],
                ));
            }
        }
        if !verdict.counter_chunk_ids.is_empty() {
            let step = trace.record(
                StepKind::Finding,
                format!(
                    "{} counter chunk(s), total weight {:.2}",
                    verdict.counter_chunk_ids.len(),
                    verdict.counter_weight
                ),
                verdict.counter_chunk_ids.clone(),
            );
            key_findings.push(ReportField::new(
                format!(
                    "{} piece(s) of evidence cut against the hypothesis (weight {:.2}).",
                    verdict.counter_chunk_ids.len(),
                    verdict.counter_weight
                ),
                vec![step],
            ));
        }
        let search_text = if verdict.counter_search.performed {
            if verdict.counter_search.hits.is_empty() {
                "Counter-evidence was actively searched for and none was found.".to_string()
            } else {
                format!(
                    "Counter-evidence was actively searched for and {} piece(s) were found.",
                    verdict.counter_search.hits.len()
                )
            }
        } else {
            "The search for counter-evidence did not complete, so the hypothesis cannot be reported as supported.".to_string()
        };
        let search_ref = trace.record(
            StepKind::CounterSearch,
            "Counter-evidence search outcome carried into the report",
            if verdict.counter_search.hits.is_empty() {
                examined.clone()
            } else {
                verdict.counter_search.hits.clone()
            },
        );
        key_findings.push(ReportField::new(
            search_text,
            [Some(search_ref), search_step].into_iter().flatten().collect(),
        ));

        // Confidence
        let types: BTreeSet<EvidenceType> = relevant
            .iter()
            .filter_map(|id| store.get(id))
            .map(|c| c.evidence_type)
            .collect();
        let level = confidence_level(verdict.confidence, types.len(), relevant.len());
        let confidence_step = trace.record(
            StepKind::Threshold,
            format!(
                "Confidence level {} from {:.2} over {} distinct type(s) and {} chunk(s)",
                level,
                verdict.confidence,
                types.len(),
                relevant.len()
            ),
            relevant_or_examined.clone(),
        );
        let confidence = ReportField::new(
            format!(
                "{:.2} ({}), {} confidence: {} relevant chunk(s) across {} evidence type(s).",
                verdict.confidence,
                verdict.verdict_kind,
                level,
                relevant.len(),
                types.len()
            ),
            [Some(confidence_step), score_step, verdict_step]
                .into_iter()
                .flatten()
                .collect(),
        );

        // Caveats and next steps
        let current_owned: Vec<EvidenceChunk> = current.iter().map(|c| (*c).clone()).collect();
        let gaps = detect_gaps(&current_owned, &self.config.expected_coverage, self.config.min_per_type);
        let (mut caveats, gap_steps) = self.gap_caveats(&gaps, &examined, &mut trace);
        if !verdict.counter_chunk_ids.is_empty() && verdict.verdict_kind != VerdictKind::Contradicted {
            let step = trace.record(
                StepKind::Finding,
                "Counter-evidence present alongside support",
                verdict.counter_chunk_ids.clone(),
            );
            caveats.push(ReportField::new(
                "Some evidence contradicts the hypothesis; see key findings.",
                vec![step],
            ));
        }
        if caveats.is_empty() {
            let step = trace.record(
                StepKind::Gap,
                "No coverage gaps against the expected evidence types",
                examined.clone(),
            );
            caveats.push(ReportField::new("No coverage gaps against the expected evidence types.", vec![step]));
        }

        let template_step = trace.record(
            StepKind::Finding,
            format!("Next steps follow from verdict {}", verdict.verdict_kind),
            relevant_or_examined,
        );
        let mut next_steps: Vec<ReportField> = next_steps_for(verdict.verdict_kind)
            .iter()
            .map(|text| ReportField::new(*text, [Some(template_step), verdict_step].into_iter().flatten().collect()))
            .collect();
        next_steps.extend(
            gaps.iter()
                .zip(gap_steps)
                .map(|(gap, step)| ReportField::new(gap.suggestion.clone(), vec![step])),
        );

        info!(
            verdict_id = %verdict.id,
            findings = key_findings.len(),
            caveats = caveats.len(),
            "Stakeholder report generated"
        );

        StakeholderReport {
            subject: ReportSubject::Verdict {
                hypothesis: hypothesis.statement.clone(),
                verdict_id: verdict.id.clone(),
                verdict_kind: verdict.verdict_kind,
            },
            headline,
            evidence_base,
            counts_by_type,
            key_findings,
            confidence,
            caveats,
            next_steps,
            trace,
        }
    }

    /// Report on a pattern set.
    pub fn for_patterns(&self, set: &PatternSet, store: &EvidenceStore) -> StakeholderReport {
        let current: Vec<&EvidenceChunk> = store.current().collect();
        let examined = set.examined.clone();
        let mut trace = ReasoningTrace::new();
        trace.append(&set.trace);

        let (evidence_base, counts_by_type) = self.evidence_base(&current, &mut trace);
        let contradictory = set.contradictions().count();

        let headline_step = trace.record(
            StepKind::Finding,
            format!(
                "{} pattern(s) over {} examined chunk(s), {} with contradictions",
                set.patterns.len(),
                examined.len(),
                contradictory
            ),
            examined.clone(),
        );
        let headline = ReportField::new(
            if set.patterns.is_empty() {
                format!("No recurring themes found across {} evidence chunk(s).", examined.len())
            } else {
                format!(
                    "{} theme(s) emerge across {} evidence chunk(s); {} contain contradicting evidence.",
                    set.patterns.len(),
                    examined.len(),
                    contradictory
                )
            },
            vec![headline_step],
        );

        let mut key_findings = Vec::new();
        for pattern in &set.patterns {
            let step = trace.record(
                StepKind::Finding,
                format!("Pattern \"{}\" has {} member(s)", pattern.theme, pattern.member_chunk_ids.len()),
                pattern.member_chunk_ids.clone(),
            );
            let supporting = pattern.supporting_chunk_ids.len();
            let contradicting = pattern.contradicting_chunk_ids.len();
            let neutral = pattern
                .member_chunk_ids
                .len()
                .saturating_sub(supporting + contradicting);
            let mut text = format!("{}: {} supporting chunk(s)", pattern.theme, supporting);
            if pattern.contradiction_flag {
                text.push_str(&format!(", {} contradicting", contradicting));
            }
            if neutral > 0 {
                text.push_str(&format!(", {} neutral", neutral));
            }
            text.push('.');
            key_findings.push(ReportField::new(text, vec![step]));
        }
        if key_findings.is_empty() {
            key_findings.push(ReportField::new(
                "No group of chunks shares a theme strongly enough to form a pattern.",
                vec![headline_step],
            ));
        }

        let distinct_types = counts_by_type.len();
        let level = confidence_level(1.0, distinct_types, examined.len());
        let confidence_step = trace.record(
            StepKind::Threshold,
            format!(
                "Coverage level {} from {} distinct type(s) over {} chunk(s)",
                level,
                distinct_types,
                examined.len()
            ),
            examined.clone(),
        );
        let confidence = ReportField::new(
            format!(
                "Evidence diversity supports at most {} confidence in these themes: {} evidence type(s) across {} chunk(s).",
                level,
                distinct_types,
                examined.len()
            ),
            vec![confidence_step],
        );

        let (mut caveats, gap_steps) = self.gap_caveats(&set.gaps, &examined, &mut trace);
        if let Some(failure) = &set.partial_failure {
            let step = trace.record(StepKind::ServiceFailure, failure.explanation.clone(), set.unclustered.clone());
            caveats.push(ReportField::new(
                format!("Clustering was incomplete: {}.", failure.explanation),
                vec![step],
            ));
        }
        if caveats.is_empty() {
            let step = trace.record(
                StepKind::Gap,
                "No coverage gaps against the expected evidence types",
                examined.clone(),
            );
            caveats.push(ReportField::new("No coverage gaps against the expected evidence types.", vec![step]));
        }

        let mut next_steps = Vec::new();
        if let Some(largest) = set.patterns.iter().max_by_key(|p| p.member_chunk_ids.len()) {
            let step = trace.record(
                StepKind::Finding,
                format!("Largest pattern is \"{}\"", largest.theme),
                largest.member_chunk_ids.clone(),
            );
            next_steps.push(ReportField::new(
                format!("Turn \"{}\" into an explicit hypothesis and test it.", largest.theme),
                vec![step],
            ));
        }
        for pattern in set.contradictions() {
            let step = trace.record(
                StepKind::Finding,
                format!("Pattern \"{}\" is internally contradictory", pattern.theme),
                pattern.contradicting_chunk_ids.clone(),
            );
            next_steps.push(ReportField::new(
                format!("Find out why evidence disagrees within \"{}\".", pattern.theme),
                vec![step],
            ));
        }
        next_steps.extend(
            set.gaps
                .iter()
                .zip(gap_steps)
                .map(|(gap, step)| ReportField::new(gap.suggestion.clone(), vec![step])),
        );
        if next_steps.is_empty() {
            next_steps.push(ReportField::new(
                "Add more evidence so that themes can emerge.",
                vec![headline_step],
            ));
        }

        info!(
            patterns = set.patterns.len(),
            caveats = caveats.len(),
            "Stakeholder report generated"
        );

        StakeholderReport {
            subject: ReportSubject::Patterns {
                pattern_count: set.patterns.len(),
            },
            headline,
            evidence_base,
            counts_by_type,
            key_findings,
            confidence,
            caveats,
            next_steps,
            trace,
        }
    }

    fn evidence_base(
        &self,
        current: &[&EvidenceChunk],
        trace: &mut ReasoningTrace,
    ) -> (ReportField, BTreeMap<EvidenceType, usize>) {
        let counts = crate::evidence::count_by_type(current.iter().copied());
        let breakdown: Vec<String> = counts.iter().map(|(t, n)| format!("{} {}", n, t)).collect();
        let summary = if breakdown.is_empty() {
            "none".to_string()
        } else {
            breakdown.join(", ")
        };
        let step = trace.record(
            StepKind::Count,
            format!("Evidence base: {} current chunk(s) ({})", current.len(), summary),
            ids(current),
        );
        let field = ReportField::new(
            format!(
                "{} evidence chunk(s) across {} type(s).",
                current.len(),
                counts.len()
            ),
            vec![step],
        );
        (field, counts)
    }

    fn gap_caveats(
        &self,
        gaps: &[Gap],
        examined: &[String],
        trace: &mut ReasoningTrace,
    ) -> (Vec<ReportField>, Vec<usize>) {
        let mut caveats = Vec::new();
        let mut steps = Vec::new();
        for gap in gaps {
            let step = trace.record(StepKind::Gap, gap.description.clone(), examined.iter().cloned());
            steps.push(step);
            caveats.push(ReportField::new(capitalize(&gap.description), vec![step]));
        }
        (caveats, steps)
    }

    fn strongest<'a>(&self, chunk_ids: &[String], store: &'a EvidenceStore) -> Option<&'a EvidenceChunk> {
        let scorer = super::ConfidenceScorer::new();
        chunk_ids
            .iter()
            .filter_map(|id| store.get(id))
            .fold(None, |best: Option<(&EvidenceChunk, f64)>, chunk| {
                let weight = scorer.weight(chunk);
                match best {
                    Some((_, w)) if w >= weight => best,
                    _ => Some((chunk, weight)),
                }
            })
            .map(|(chunk, _)| chunk)
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
