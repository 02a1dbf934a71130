//! Config environment variable tests
//!
//! These tests verify that Config::from_env() reads and applies environment
//! variable overrides, including the engine thresholds.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use evidence_engine::config::{Config, EngineConfig, LogFormat};
use evidence_engine::evidence::EvidenceType;
use serial_test::serial;
use std::env;

fn with_api_key() {
    env::set_var("LANGBASE_API_KEY", "test-key");
}

#[test]
#[serial]
fn test_config_from_env_loads_successfully() {
    with_api_key();

    let config = Config::from_env().unwrap();
    assert_eq!(config.langbase.api_key, "test-key");
    assert_eq!(config.engine, EngineConfig::default());
}

#[test]
#[serial]
fn test_config_from_env_custom_base_url() {
    with_api_key();
    env::set_var("LANGBASE_BASE_URL", "https://custom.api.com");

    let config = Config::from_env().unwrap();
    assert_eq!(config.langbase.base_url, "https://custom.api.com");

    env::remove_var("LANGBASE_BASE_URL");
}

#[test]
#[serial]
fn test_config_from_env_custom_database() {
    with_api_key();
    env::set_var("DATABASE_PATH", "/custom/evidence.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/evidence.db");
    assert_eq!(config.database.max_connections, 10);

    env::remove_var("DATABASE_PATH");
    env::remove_var("DATABASE_MAX_CONNECTIONS");
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    with_api_key();
    env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    env::remove_var("LOG_FORMAT");
}

#[test]
#[serial]
fn test_config_from_env_custom_request() {
    with_api_key();
    env::set_var("REQUEST_TIMEOUT_MS", "60000");
    env::set_var("MAX_RETRIES", "5");
    env::set_var("RETRY_DELAY_MS", "2000");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.timeout_ms, 60000);
    assert_eq!(config.request.max_retries, 5);
    assert_eq!(config.request.retry_delay_ms, 2000);

    env::remove_var("REQUEST_TIMEOUT_MS");
    env::remove_var("MAX_RETRIES");
    env::remove_var("RETRY_DELAY_MS");
}

#[test]
#[serial]
fn test_config_from_env_custom_pipes() {
    with_api_key();
    env::set_var("PIPE_EXTRACTION", "extractor-v2");
    env::set_var("PIPE_INTENT", "intent-v2");

    let config = Config::from_env().unwrap();
    assert_eq!(config.pipes.extraction, "extractor-v2");
    assert_eq!(config.pipes.relevance, "evidence-relevance-v1");
    assert_eq!(config.pipes.intent, "intent-v2");

    env::remove_var("PIPE_EXTRACTION");
    env::remove_var("PIPE_INTENT");
}

#[test]
#[serial]
fn test_config_invalid_number_uses_default() {
    with_api_key();
    env::set_var("DATABASE_MAX_CONNECTIONS", "not-a-number");
    env::set_var("MIN_EVIDENCE", "lots");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.engine.min_evidence, 2);

    env::remove_var("DATABASE_MAX_CONNECTIONS");
    env::remove_var("MIN_EVIDENCE");
}

#[test]
#[serial]
fn test_config_from_env_engine_thresholds() {
    with_api_key();
    env::set_var("SUPPORTED_CONFIDENCE", "0.8");
    env::set_var("CONTRADICTED_CONFIDENCE", "0.2");
    env::set_var("MIN_PER_TYPE", "3");
    env::set_var("EXPECTED_COVERAGE", "analytics_data, user_quote");

    let config = Config::from_env().unwrap();
    assert_eq!(config.engine.supported_confidence, 0.8);
    assert_eq!(config.engine.contradicted_confidence, 0.2);
    assert_eq!(config.engine.min_per_type, 3);
    assert_eq!(
        config.engine.expected_coverage,
        vec![EvidenceType::AnalyticsData, EvidenceType::UserQuote]
    );

    env::remove_var("SUPPORTED_CONFIDENCE");
    env::remove_var("CONTRADICTED_CONFIDENCE");
    env::remove_var("MIN_PER_TYPE");
    env::remove_var("EXPECTED_COVERAGE");
}

#[test]
#[serial]
fn test_config_rejects_unknown_coverage_type() {
    with_api_key();
    env::set_var("EXPECTED_COVERAGE", "user_quote,market_research");

    let result = Config::from_env();
    assert!(result.is_err());

    env::remove_var("EXPECTED_COVERAGE");
}

#[test]
#[serial]
fn test_config_rejects_inverted_thresholds() {
    with_api_key();
    env::set_var("SUPPORTED_CONFIDENCE", "0.3");
    env::set_var("CONTRADICTED_CONFIDENCE", "0.6");

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("CONTRADICTED_CONFIDENCE"));

    env::remove_var("SUPPORTED_CONFIDENCE");
    env::remove_var("CONTRADICTED_CONFIDENCE");
}

#[test]
#[serial]
fn test_config_from_env_log_level() {
    with_api_key();
    env::set_var("LOG_LEVEL", "debug");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.level, "debug");

    env::remove_var("LOG_LEVEL");
}
