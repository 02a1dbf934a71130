//! Core infrastructure shared by all engine components.
//!
//! This module provides the [`ModeCore`] struct that centralizes the three
//! external services used across the component implementations.

use std::sync::Arc;

use crate::services::{ExtractionService, IntentService, LangbaseServices, RelevanceService};

/// External services shared by all engine components.
///
/// Composed into each component so that any implementation of the three
/// service traits can be swapped in without touching engine logic.
#[derive(Clone)]
pub struct ModeCore {
    extraction: Arc<dyn ExtractionService>,
    relevance: Arc<dyn RelevanceService>,
    intent: Arc<dyn IntentService>,
}

impl ModeCore {
    /// Create a core from three independent service implementations.
    pub fn new(
        extraction: Arc<dyn ExtractionService>,
        relevance: Arc<dyn RelevanceService>,
        intent: Arc<dyn IntentService>,
    ) -> Self {
        Self {
            extraction,
            relevance,
            intent,
        }
    }

    /// Create a core backed entirely by Langbase pipes.
    pub fn from_langbase(services: LangbaseServices) -> Self {
        let shared = Arc::new(services);
        Self::new(shared.clone(), shared.clone(), shared)
    }

    #[inline]
    pub fn extraction(&self) -> &dyn ExtractionService {
        self.extraction.as_ref()
    }

    #[inline]
    pub fn relevance(&self) -> &dyn RelevanceService {
        self.relevance.as_ref()
    }

    #[inline]
    pub fn intent(&self) -> &dyn IntentService {
        self.intent.as_ref()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::core_with;
    use crate::config::{LangbaseConfig, PipeConfig, RequestConfig};
    use crate::langbase::LangbaseClient;
    use crate::services::{IntentRequest, LangbaseServices, MockIntentService, IntentResponse};

    use super::*;

    #[test]
    fn test_mode_core_from_langbase() {
        let config = LangbaseConfig {
            api_key: "test".to_string(),
            base_url: "http://localhost:1".to_string(),
        };
        let client = LangbaseClient::new(&config, RequestConfig::default()).unwrap();
        let core = ModeCore::from_langbase(LangbaseServices::new(client, PipeConfig::default()));
        let cloned = core.clone();
        assert!(Arc::ptr_eq(&core.relevance, &cloned.relevance));
    }

    #[tokio::test]
    async fn test_mode_core_delegates_to_service() {
        let mut intent = MockIntentService::new();
        intent.expect_classify().times(1).returning(|_| {
            Ok(IntentResponse {
                intent_label: "extract".to_string(),
                confidence: 0.9,
                extracted_parameters: Default::default(),
            })
        });

        let core = core_with(None, None, Some(intent));
        let response = core
            .intent()
            .classify(IntentRequest {
                utterance: "notes".to_string(),
                context_summary: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(response.intent_label, "extract");
    }
}
