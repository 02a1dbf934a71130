use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{serialize_for_log, Intent, ModeCore};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::evidence::{normalize_statement, Session, SessionContext};
use crate::services::IntentRequest;

/// Confidence reported for command prefixes the local heuristics recognise.
pub const HEURISTIC_CONFIDENCE: f64 = 0.95;

/// Confidence reported when the intent service failed and fallback routing applied.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Utterances longer than this, in a session without evidence, are treated
/// as pasted research notes when the intent service is unreachable.
pub const FALLBACK_EXTRACT_CHARS: usize = 500;

/// Courtesy words skipped before matching a command prefix.
const LEADING_COURTESIES: [&str; 3] = ["please ", "can you ", "could you "];

/// Command prefixes that introduce a hypothesis to test.
const TEST_PHRASES: [&str; 5] = [
    "test my hypothesis that ",
    "test the hypothesis that ",
    "test whether ",
    "is it true that ",
    "check whether ",
];

/// Command prefixes that introduce an assumption to challenge.
const CHALLENGE_PHRASES: [&str; 3] = [
    "challenge my assumption that ",
    "challenge the assumption that ",
    "play devil's advocate on ",
];

/// Command prefixes that ask how well a claim is supported.
const CONFIDENCE_PHRASES: [&str; 2] = [
    "how confident are we that ",
    "how confident can we be that ",
];

/// Where a routing decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Heuristics,
    Service,
}

/// Parameters extracted from the utterance and resolved against the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl IntentParameters {
    fn with_statement(statement: &str) -> Self {
        let statement = normalize_statement(statement);
        Self {
            statement: (!statement.is_empty()).then_some(statement),
            ..Self::default()
        }
    }

    fn from_service(params: &serde_json::Map<String, Value>) -> Self {
        Self {
            statement: first_string(params, &["statement", "hypothesis", "assumption"])
                .map(|s| normalize_statement(&s))
                .filter(|s| !s.is_empty()),
            text: first_string(params, &["text", "raw_text"]),
            source: first_string(params, &["source"]),
        }
    }
}

fn first_string(params: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| params.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// A routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedIntent {
    pub intent: Intent,
    pub confidence: f64,
    pub parameters: IntentParameters,
    pub source: RouteSource,
}

/// Recognise an explicit command without calling the intent service.
///
/// Only utterances that *start* with a command prefix match, so pasted
/// research text that merely mentions a keyword always reaches the service.
pub fn local_heuristics(utterance: &str) -> Option<(Intent, IntentParameters)> {
    let trimmed = utterance.trim_start();
    let lower = trimmed.to_lowercase();
    // Lowercasing can change byte lengths outside ASCII; slice the lowered text then.
    let original = if lower.len() == trimmed.len() {
        trimmed
    } else {
        lower.as_str()
    };

    let offset = LEADING_COURTESIES
        .iter()
        .find(|courtesy| lower.starts_with(*courtesy))
        .map_or(0, |courtesy| courtesy.len());
    let command = &lower[offset..];

    let rest_after = |phrase: &str| -> Option<String> {
        command
            .starts_with(phrase)
            .then_some(offset + phrase.len())
            .filter(|end| original.is_char_boundary(*end))
            .map(|end| original[end..].trim_end_matches('?').to_string())
    };

    let commands: [(Intent, &[&str]); 3] = [
        (Intent::AssumptionChallenge, &CHALLENGE_PHRASES[..]),
        (Intent::HypothesisTest, &TEST_PHRASES[..]),
        (Intent::ConfidenceAssess, &CONFIDENCE_PHRASES[..]),
    ];
    for (intent, phrases) in commands {
        if let Some(rest) = phrases.iter().copied().find_map(|phrase| rest_after(phrase)) {
            return Some((intent, IntentParameters::with_statement(&rest)));
        }
    }

    None
}

/// Routing used when the intent service cannot be reached.
///
/// Long input in a session without evidence is taken to be research notes;
/// anything else has no safe default.
pub fn fallback_intent(utterance: &str, context: &SessionContext) -> Option<Intent> {
    let long_input = utterance.trim().chars().count() > FALLBACK_EXTRACT_CHARS;
    (long_input && !context.has_evidence()).then_some(Intent::Extract)
}

/// Question asked back when the intent cannot be determined.
pub fn clarifying_question(context: &SessionContext) -> String {
    if let Some(statement) = &context.latest_hypothesis {
        format!(
            "I'm not sure what you'd like to do. Should I re-test \"{}\", look for patterns across the evidence, or prepare a stakeholder report?",
            statement
        )
    } else if context.has_evidence() {
        format!(
            "I'm not sure what you'd like to do. Do you want to test a hypothesis against the {} evidence chunk(s), look for patterns, or add more evidence?",
            context.chunk_count
        )
    } else {
        "I'm not sure what you'd like to do. Do you want to paste research notes to extract evidence, or state a hypothesis to test?".to_string()
    }
}

/// Classifies utterances into operating modes.
#[derive(Clone)]
pub struct IntentRouter {
    core: ModeCore,
    threshold: f64,
}

impl IntentRouter {
    pub fn new(core: ModeCore, config: &EngineConfig) -> Self {
        Self {
            core,
            threshold: config.intent_confidence,
        }
    }

    /// Route an utterance, resolving missing parameters from the session.
    pub async fn route(&self, utterance: &str, session: &Session) -> EngineResult<RoutedIntent> {
        if utterance.trim().is_empty() {
            return Err(EngineError::Validation {
                field: "utterance".to_string(),
                reason: "Utterance cannot be empty".to_string(),
            });
        }

        let context = session.context_summary();

        let (intent, confidence, parameters, source) = match local_heuristics(utterance) {
            Some((intent, parameters)) => {
                debug!(intent = %intent, "Intent matched by command prefix");
                (intent, HEURISTIC_CONFIDENCE, parameters, RouteSource::Heuristics)
            }
            None => {
                let classified = self
                    .core
                    .intent()
                    .classify(IntentRequest {
                        utterance: utterance.to_string(),
                        context_summary: context.describe(),
                    })
                    .await;
                let response = match classified {
                    Ok(response) => response,
                    Err(e) => match fallback_intent(utterance, &context) {
                        Some(intent) => {
                            warn!(
                                error = %e,
                                intent = %intent,
                                chunks = context.chunk_count,
                                "Intent service failed, routing long input without evidence to extraction"
                            );
                            let parameters =
                                resolve_parameters(intent, IntentParameters::default(), utterance, session)?;
                            return Ok(RoutedIntent {
                                intent,
                                confidence: FALLBACK_CONFIDENCE,
                                parameters,
                                source: RouteSource::Heuristics,
                            });
                        }
                        None => return Err(e.into_engine_error("intent")),
                    },
                };

                let intent = match response.intent_label.parse::<Intent>() {
                    Ok(intent) => intent,
                    Err(_) => {
                        debug!(label = %response.intent_label, "Unknown intent label");
                        return Err(EngineError::AmbiguousIntent {
                            question: clarifying_question(&context),
                        });
                    }
                };
                if response.confidence.is_nan() || response.confidence < self.threshold {
                    debug!(
                        intent = %intent,
                        confidence = response.confidence,
                        threshold = self.threshold,
                        "Intent confidence below threshold"
                    );
                    return Err(EngineError::AmbiguousIntent {
                        question: clarifying_question(&context),
                    });
                }
                (
                    intent,
                    response.confidence,
                    IntentParameters::from_service(&response.extracted_parameters),
                    RouteSource::Service,
                )
            }
        };

        let parameters = resolve_parameters(intent, parameters, utterance, session)?;
        let routed = RoutedIntent {
            intent,
            confidence,
            parameters,
            source,
        };

        info!(
            intent = %routed.intent,
            confidence = routed.confidence,
            parameters = %serialize_for_log(&routed.parameters, "route parameters"),
            "Utterance routed"
        );
        Ok(routed)
    }
}

fn resolve_parameters(
    intent: Intent,
    mut parameters: IntentParameters,
    utterance: &str,
    session: &Session,
) -> EngineResult<IntentParameters> {
    if intent.needs_statement() && parameters.statement.is_none() {
        match session.latest_hypothesis() {
            Some(h) => parameters.statement = Some(h.statement.clone()),
            None => {
                let verb = match intent {
                    Intent::AssumptionChallenge => "challenge",
                    Intent::ConfidenceAssess => "assess",
                    _ => "test",
                };
                return Err(EngineError::AmbiguousIntent {
                    question: format!(
                        "Which hypothesis would you like me to {}? There is no hypothesis in this session yet.",
                        verb
                    ),
                });
            }
        }
    }

    if intent == Intent::Extract && parameters.text.is_none() {
        parameters.text = Some(utterance.trim().to_string());
    }

    Ok(parameters)
}
