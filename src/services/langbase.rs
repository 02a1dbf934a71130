use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{
    ChunkAssessment, ExtractionRequest, ExtractionService, IntentRequest, IntentResponse,
    IntentService, RelevanceRequest, RelevanceResponse, RelevanceService,
};
use crate::config::{Config, PipeConfig};
use crate::error::{LangbaseResult, ServiceError, ServiceResult};
use crate::evidence::Polarity;
use crate::langbase::{LangbaseClient, Message, PipeRequest};
use crate::modes::extract_json_from_completion;
use crate::prompts::{EXTRACTION_PROMPT, INTENT_PROMPT, RELEVANCE_PROMPT};

/// All three external services backed by Langbase pipes.
#[derive(Clone)]
pub struct LangbaseServices {
    langbase: LangbaseClient,
    pipes: PipeConfig,
}

impl LangbaseServices {
    /// Create services using the given client and pipe names
    pub fn new(langbase: LangbaseClient, pipes: PipeConfig) -> Self {
        Self { langbase, pipes }
    }

    /// Create services from the full application config
    pub fn from_config(langbase: LangbaseClient, config: &Config) -> Self {
        Self::new(langbase, config.pipes.clone())
    }

    /// Create or update the three pipes with their system prompts.
    pub async fn ensure_pipes(&self) -> LangbaseResult<()> {
        self.langbase
            .ensure_pipe(
                &self.pipes.extraction,
                "Evidence extraction and classification",
                EXTRACTION_PROMPT,
                0.1,
            )
            .await?;
        self.langbase
            .ensure_pipe(
                &self.pipes.relevance,
                "Evidence relevance and polarity scoring",
                RELEVANCE_PROMPT,
                0.0,
            )
            .await?;
        self.langbase
            .ensure_pipe(
                &self.pipes.intent,
                "Utterance intent classification",
                INTENT_PROMPT,
                0.0,
            )
            .await
    }

    async fn run_pipe(&self, pipe: &str, system: &str, user: String) -> ServiceResult<String> {
        let start = Instant::now();
        let request = PipeRequest::new(pipe, vec![Message::system(system), Message::user(user)]);
        let response = self.langbase.call_pipe(request).await?;
        debug!(
            pipe = %pipe,
            latency_ms = start.elapsed().as_millis(),
            "Pipe completion received"
        );
        Ok(response.completion)
    }
}

#[async_trait]
impl ExtractionService for LangbaseServices {
    async fn extract(&self, request: ExtractionRequest) -> ServiceResult<Vec<Value>> {
        let mut user = format!("Output schema: {}\n", request.schema_description);
        if let Some(source) = &request.source_hint {
            user.push_str(&format!("Source label: {}\n", source));
        }
        user.push_str(&format!("\nRaw input:\n{}", request.raw_text));

        let completion = self
            .run_pipe(&self.pipes.extraction, EXTRACTION_PROMPT, user)
            .await?;
        let items = parse_extraction(&completion)?;

        info!(items = items.len(), "Extraction pipe returned items");
        Ok(items)
    }
}

#[async_trait]
impl RelevanceService for LangbaseServices {
    async fn assess(&self, request: RelevanceRequest) -> ServiceResult<RelevanceResponse> {
        let user = serde_json::to_string(&request).map_err(|e| ServiceError::Parse {
            message: format!("Failed to encode relevance request: {}", e),
        })?;

        let completion = self
            .run_pipe(&self.pipes.relevance, RELEVANCE_PROMPT, user)
            .await?;
        parse_relevance(&completion)
    }
}

#[async_trait]
impl IntentService for LangbaseServices {
    async fn classify(&self, request: IntentRequest) -> ServiceResult<IntentResponse> {
        let user = format!(
            "Session context: {}\n\nUtterance:\n{}",
            request.context_summary, request.utterance
        );

        let completion = self.run_pipe(&self.pipes.intent, INTENT_PROMPT, user).await?;
        let json = extract_json_from_completion(&completion)
            .map_err(|message| ServiceError::Parse { message })?;
        serde_json::from_str::<IntentResponse>(json).map_err(|e| ServiceError::Parse {
            message: format!("Invalid intent response: {}", e),
        })
    }
}

/// Pull the item list out of an extraction completion.
///
/// Accepts a bare array or an object holding it under `chunks` or `items`.
/// Items themselves are not validated here.
pub(crate) fn parse_extraction(completion: &str) -> ServiceResult<Vec<Value>> {
    let json = extract_json_from_completion(completion)
        .map_err(|message| ServiceError::Parse { message })?;
    let value: Value = serde_json::from_str(json).map_err(|e| ServiceError::Parse {
        message: format!("Extraction response is not valid JSON: {}", e),
    })?;

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("chunks").or_else(|| map.remove("items")) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ServiceError::Parse {
                message: "Extraction response has no chunk array".to_string(),
            }),
        },
        other => Err(ServiceError::Parse {
            message: format!("Extraction response must be an array, got {}", json_kind(&other)),
        }),
    }
}

/// Parse a relevance completion leniently.
///
/// Assessments missing an id or score, or carrying an unknown polarity, are
/// dropped with a warning. Scores are clamped to 0-1.
pub(crate) fn parse_relevance(completion: &str) -> ServiceResult<RelevanceResponse> {
    let json = extract_json_from_completion(completion)
        .map_err(|message| ServiceError::Parse { message })?;
    let value: Value = serde_json::from_str(json).map_err(|e| ServiceError::Parse {
        message: format!("Relevance response is not valid JSON: {}", e),
    })?;

    let (items, theme) = match value {
        Value::Array(items) => (items, None),
        Value::Object(mut map) => {
            let theme = map
                .remove("theme")
                .and_then(|t| t.as_str().map(str::to_string))
                .filter(|t| !t.trim().is_empty());
            match map.remove("assessments") {
                Some(Value::Array(items)) => (items, theme),
                _ => {
                    return Err(ServiceError::Parse {
                        message: "Relevance response has no assessments array".to_string(),
                    })
                }
            }
        }
        other => {
            return Err(ServiceError::Parse {
                message: format!("Relevance response must be an object, got {}", json_kind(&other)),
            })
        }
    };

    let mut assessments = Vec::with_capacity(items.len());
    for item in items {
        let chunk_id = item.get("chunk_id").and_then(Value::as_str);
        let score = item.get("relevance_score").and_then(Value::as_f64);
        let polarity = item
            .get("polarity")
            .and_then(Value::as_str)
            .and_then(|p| p.parse::<Polarity>().ok());

        match (chunk_id, score, polarity) {
            (Some(chunk_id), Some(score), Some(polarity)) => assessments.push(ChunkAssessment {
                chunk_id: chunk_id.to_string(),
                relevance_score: score.clamp(0.0, 1.0),
                polarity,
            }),
            _ => warn!(item = %item, "Dropping malformed relevance assessment"),
        }
    }

    Ok(RelevanceResponse { assessments, theme })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
