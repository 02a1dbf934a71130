//! # Evidence Engine
//!
//! A product-discovery reasoning engine. Research notes become typed,
//! deduplicated evidence; hypotheses are tested against that evidence with
//! an explicit counter-evidence search; every conclusion carries a reasoning
//! trace back to the chunks it rests on.
//!
//! ## Components
//!
//! - **Evidence extraction**: raw text to typed chunks via an extraction service
//! - **Confidence scoring**: source-type and specificity weighted confidence
//! - **Hypothesis testing**: verdicts with mandatory counter-evidence search
//! - **Pattern synthesis**: themes, contradictions and coverage gaps
//! - **Intent routing**: one utterance to one operating mode
//! - **Stakeholder reports**: deterministic, fully traced summaries
//!
//! ## Architecture
//!
//! ```text
//! Utterance → EvidenceEngine → Extraction / Relevance / Intent services
//!                   ↓                       (Langbase pipes over HTTP)
//!         Session projection in, updated projection out
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use evidence_engine::{Config, EvidenceEngine, ModeCore, Session};
//! use evidence_engine::langbase::LangbaseClient;
//! use evidence_engine::services::LangbaseServices;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = LangbaseClient::new(&config.langbase, config.request.clone())?;
//!     let core = ModeCore::from_langbase(LangbaseServices::from_config(client, &config));
//!     let engine = EvidenceEngine::new(core, config.engine.clone());
//!
//!     let run = engine.run(&Session::new(), "Find patterns in our evidence").await?;
//!     println!("{}", run.output.to_markdown());
//!     Ok(())
//! }
//! ```

/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Evidence data model, the evidence store and sessions.
pub mod evidence;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// Engine components and the per-utterance pipeline.
pub mod modes;
/// System prompts for Langbase pipes.
pub mod prompts;
/// External service interfaces and their pipe-backed implementation.
pub mod services;
/// Session persistence for the command-line front-end.
pub mod storage;
/// Reasoning traces.
pub mod trace;

pub use config::{Config, EngineConfig};
pub use error::{AppError, AppResult, EngineError, EngineResult};
pub use evidence::{EvidenceChunk, EvidenceStore, EvidenceType, Hypothesis, Session, Verdict, VerdictKind};
pub use modes::{EvidenceEngine, ModeCore, PipelineOutput, PipelineRun};
pub use trace::ReasoningTrace;
