use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Errors raised by the reasoning engine.
///
/// Only schema-level failures abort a pipeline run. Evidentiary uncertainty
/// (too little evidence, contradictions) is never represented here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Extraction response could not be parsed: {message}")]
    ExtractionParse {
        message: String,
        /// Leading part of the raw text so the caller can offer it back verbatim.
        raw_text_preview: String,
    },

    #[error("Duplicate evidence: {similarity:.2} similar to chunk {existing_id}")]
    DuplicateEvidence { existing_id: String, similarity: f64 },

    #[error("Ambiguous intent: {question}")]
    AmbiguousIntent { question: String },

    #[error("External service '{service}' timed out after {timeout_ms}ms")]
    ExternalServiceTimeout { service: String, timeout_ms: u64 },

    #[error("External service '{service}' rate limited (retries: {retries})")]
    ExternalServiceRateLimit { service: String, retries: u32 },

    #[error("External service '{service}' unavailable: {message}")]
    ExternalServiceUnavailable { service: String, message: String },

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },
}

/// Errors a concrete external-service implementation may return.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Service call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Service rate limited (retries: {retries})")]
    RateLimited { retries: u32 },

    #[error("Service unavailable: {message}")]
    Unavailable { message: String },

    #[error("Service response did not match schema: {message}")]
    Parse { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Session snapshot could not be (de)serialized: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Langbase API errors
#[derive(Debug, Error)]
pub enum LangbaseError {
    #[error("Langbase unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by Langbase (retries: {retries})")]
    RateLimited { retries: u32 },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LangbaseError {
    /// Whether a retry may succeed where this attempt failed.
    pub fn is_transient(&self) -> bool {
        match self {
            LangbaseError::Timeout { .. } | LangbaseError::RateLimited { .. } => true,
            LangbaseError::Api { status, .. } => *status == 429 || *status >= 500,
            LangbaseError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            LangbaseError::Unavailable { .. } | LangbaseError::InvalidResponse { .. } => false,
        }
    }
}

impl From<LangbaseError> for ServiceError {
    fn from(err: LangbaseError) -> Self {
        match err {
            LangbaseError::Timeout { timeout_ms } => ServiceError::Timeout { timeout_ms },
            LangbaseError::RateLimited { retries } => ServiceError::RateLimited { retries },
            LangbaseError::Api { status: 429, .. } => ServiceError::RateLimited { retries: 0 },
            LangbaseError::InvalidResponse { message } => ServiceError::Parse { message },
            other => ServiceError::Unavailable {
                message: other.to_string(),
            },
        }
    }
}

impl ServiceError {
    /// Attribute a service failure to the named service at engine level.
    pub fn into_engine_error(self, service: &str) -> EngineError {
        let service = service.to_string();
        match self {
            ServiceError::Timeout { timeout_ms } => {
                EngineError::ExternalServiceTimeout { service, timeout_ms }
            }
            ServiceError::RateLimited { retries } => {
                EngineError::ExternalServiceRateLimit { service, retries }
            }
            ServiceError::Unavailable { message } | ServiceError::Parse { message } => {
                EngineError::ExternalServiceUnavailable { service, message }
            }
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for external-service calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Langbase operations
pub type LangbaseResult<T> = Result<T, LangbaseError>;
