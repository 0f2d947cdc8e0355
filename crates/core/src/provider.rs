//! Provider trait: the abstraction over the upstream generative-AI API.
//!
//! A Provider knows how to submit a `PromptPayload` to one named model and
//! return generated text or a typed `ProviderError`. All upstream response
//! shapes are normalized inside the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, ProviderError};
use crate::prompt::PromptPayload;

/// Text generated by one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// The generated text
    pub text: String,

    /// Which model produced it
    pub model: String,
}

/// The result of a single dispatch to one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Success {
        text: String,
        model: String,
    },
    Failure {
        model: String,
        kind: FailureKind,
        message: String,
    },
}

impl DispatchOutcome {
    /// Fold a provider result into an outcome for `model`.
    pub fn from_result(model: &str, result: &Result<Generation, ProviderError>) -> Self {
        match result {
            Ok(generation) => Self::Success {
                text: generation.text.clone(),
                model: generation.model.clone(),
            },
            Err(e) => Self::Failure {
                model: model.to_string(),
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Success { model, .. } | Self::Failure { model, .. } => model,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// The core Provider trait.
///
/// The fallback orchestrator calls `generate()` once per candidate model
/// without knowing which upstream is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini").
    fn name(&self) -> &str;

    /// Submit the prompt to `model` and return the generated text.
    async fn generate(
        &self,
        model: &str,
        prompt: &PromptPayload,
    ) -> std::result::Result<Generation, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_from_success() {
        let result = Ok(Generation {
            text: "hi".into(),
            model: "gemini-2.5-flash".into(),
        });
        let outcome = DispatchOutcome::from_result("gemini-2.5-flash", &result);
        assert!(outcome.is_success());
        assert_eq!(outcome.model(), "gemini-2.5-flash");
    }

    #[test]
    fn outcome_from_failure_keeps_classification() {
        let result = Err(ProviderError::RateLimited {
            retry_after_secs: Some(5),
        });
        let outcome = DispatchOutcome::from_result("gemini-2.0-flash", &result);
        match outcome {
            DispatchOutcome::Failure { model, kind, .. } => {
                assert_eq!(model, "gemini-2.0-flash");
                assert_eq!(kind, FailureKind::Retryable);
            }
            other => panic!("Expected failure, got: {other:?}"),
        }
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = DispatchOutcome::Success {
            text: "ok".into(),
            model: "m".into(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"success\""));
    }
}
