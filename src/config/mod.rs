use std::env;
use std::path::PathBuf;

use crate::error::AppError;
use crate::evidence::EvidenceType;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub engine: EngineConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Database configuration for the session snapshot store
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe name configuration, one pipe per external service
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub extraction: String,
    pub relevance: String,
    pub intent: String,
}

/// Thresholds and coverage expectations used by the reasoning components.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Similarity at or above which an incoming chunk is a near-duplicate.
    pub duplicate_similarity: f64,
    /// Minimum relevance score for a chunk to count toward a hypothesis.
    pub relevance_threshold: f64,
    /// Minimum number of non-neutral relevant chunks for a verdict.
    pub min_evidence: usize,
    /// Confidence needed for SUPPORTED.
    pub supported_confidence: f64,
    /// Confidence below which dominant counter evidence yields CONTRADICTED.
    pub contradicted_confidence: f64,
    /// Intent classification confidence below which the router asks.
    pub intent_confidence: f64,
    /// Relevance to a cluster seed needed to join its pattern.
    pub cluster_threshold: f64,
    /// Smallest cluster reported as a pattern.
    pub min_pattern_size: usize,
    /// Evidence types a well-covered store is expected to contain.
    pub expected_coverage: Vec<EvidenceType>,
    /// Minimum chunks per expected type before it stops being a gap.
    pub min_per_type: usize,
    /// Maximum characters sent to the extraction service per call.
    pub max_segment_chars: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").map_err(|_| AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/evidence.db".to_string()),
            ),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS").unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS").unwrap_or(30000),
            max_retries: parse_env("MAX_RETRIES").unwrap_or(3),
            retry_delay_ms: parse_env("RETRY_DELAY_MS").unwrap_or(1000),
        };

        let pipes = PipeConfig {
            extraction: env::var("PIPE_EXTRACTION")
                .unwrap_or_else(|_| "evidence-extractor-v1".to_string()),
            relevance: env::var("PIPE_RELEVANCE")
                .unwrap_or_else(|_| "evidence-relevance-v1".to_string()),
            intent: env::var("PIPE_INTENT").unwrap_or_else(|_| "intent-classifier-v1".to_string()),
        };

        let engine = EngineConfig::from_env()?;

        Ok(Config {
            langbase,
            database,
            logging,
            request,
            pipes,
            engine,
        })
    }
}

impl EngineConfig {
    /// Load engine thresholds, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let expected_coverage = match env::var("EXPECTED_COVERAGE") {
            Ok(raw) => parse_coverage(&raw)?,
            Err(_) => defaults.expected_coverage,
        };

        let config = Self {
            duplicate_similarity: parse_env("DUPLICATE_SIMILARITY")
                .unwrap_or(defaults.duplicate_similarity),
            relevance_threshold: parse_env("RELEVANCE_THRESHOLD")
                .unwrap_or(defaults.relevance_threshold),
            min_evidence: parse_env("MIN_EVIDENCE").unwrap_or(defaults.min_evidence),
            supported_confidence: parse_env("SUPPORTED_CONFIDENCE")
                .unwrap_or(defaults.supported_confidence),
            contradicted_confidence: parse_env("CONTRADICTED_CONFIDENCE")
                .unwrap_or(defaults.contradicted_confidence),
            intent_confidence: parse_env("INTENT_CONFIDENCE")
                .unwrap_or(defaults.intent_confidence),
            cluster_threshold: parse_env("CLUSTER_THRESHOLD").unwrap_or(defaults.cluster_threshold),
            min_pattern_size: parse_env("MIN_PATTERN_SIZE").unwrap_or(defaults.min_pattern_size),
            expected_coverage,
            min_per_type: parse_env("MIN_PER_TYPE").unwrap_or(defaults.min_per_type),
            max_segment_chars: parse_env("MAX_SEGMENT_CHARS")
                .unwrap_or(defaults.max_segment_chars),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject threshold combinations the components cannot honour.
    pub fn validate(&self) -> Result<(), AppError> {
        let unit = [
            ("DUPLICATE_SIMILARITY", self.duplicate_similarity),
            ("RELEVANCE_THRESHOLD", self.relevance_threshold),
            ("SUPPORTED_CONFIDENCE", self.supported_confidence),
            ("CONTRADICTED_CONFIDENCE", self.contradicted_confidence),
            ("INTENT_CONFIDENCE", self.intent_confidence),
            ("CLUSTER_THRESHOLD", self.cluster_threshold),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Config {
                    message: format!("{} must be between 0 and 1, got {}", name, value),
                });
            }
        }

        if self.contradicted_confidence >= self.supported_confidence {
            return Err(AppError::Config {
                message: "CONTRADICTED_CONFIDENCE must be below SUPPORTED_CONFIDENCE".to_string(),
            });
        }

        if self.max_segment_chars == 0 {
            return Err(AppError::Config {
                message: "MAX_SEGMENT_CHARS must be positive".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            duplicate_similarity: 0.9,
            relevance_threshold: 0.5,
            min_evidence: 2,
            supported_confidence: 0.75,
            contradicted_confidence: 0.3,
            intent_confidence: 0.6,
            cluster_threshold: 0.6,
            min_pattern_size: 2,
            expected_coverage: vec![
                EvidenceType::UserQuote,
                EvidenceType::BehavioralObservation,
                EvidenceType::AnalyticsData,
                EvidenceType::SupportTicket,
            ],
            min_per_type: 2,
            max_segment_chars: 4000,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            extraction: "evidence-extractor-v1".to_string(),
            relevance: "evidence-relevance-v1".to_string(),
            intent: "intent-classifier-v1".to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_coverage(raw: &str) -> Result<Vec<EvidenceType>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<EvidenceType>()
                .map_err(|e| AppError::Config { message: e })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.duplicate_similarity, 0.9);
        assert_eq!(config.min_evidence, 2);
        assert_eq!(config.supported_confidence, 0.75);
        assert_eq!(config.contradicted_confidence, 0.3);
        assert_eq!(config.expected_coverage.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let config = EngineConfig {
            relevance_threshold: 1.5,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RELEVANCE_THRESHOLD"));
    }

    #[test]
    fn test_validate_rejects_inverted_verdict_thresholds() {
        let config = EngineConfig {
            supported_confidence: 0.3,
            contradicted_confidence: 0.4,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_coverage() {
        let types = parse_coverage("analytics_data, user_quote,").unwrap();
        assert_eq!(
            types,
            vec![EvidenceType::AnalyticsData, EvidenceType::UserQuote]
        );
    }

    #[test]
    fn test_parse_coverage_unknown_type() {
        let err = parse_coverage("user_quote,gossip").unwrap_err();
        assert!(err.to_string().contains("gossip"));
    }

    #[test]
    fn test_request_config_default() {
        let config = RequestConfig::default();
        assert_eq!(config.timeout_ms, 30000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 1000);
    }
}
