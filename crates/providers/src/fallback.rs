//! Model fallback: ordered candidate queue with per-call timeouts.
//!
//! Candidates are tried strictly in order, one at a time. A retryable
//! failure (rate limit, quota, missing model, outage, timeout) moves on to
//! the next candidate; a fatal failure stops the loop at once. Every
//! attempt is reported to the usage sink.

use folio_core::error::{ChatError, ProviderError};
use folio_core::prompt::PromptPayload;
use folio_core::provider::{DispatchOutcome, Generation, Provider};
use folio_core::request::ChatReply;
use folio_core::usage::{NoopUsageSink, UsageRecord, UsageSink, UsageStatus};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default bound on a single upstream call.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs one prompt against an ordered list of candidate models.
pub struct ModelFallback {
    provider: Arc<dyn Provider>,
    candidates: Vec<String>,
    timeout: Duration,
    usage: Arc<dyn UsageSink>,
}

/// Everything that happened during one fallback run.
#[derive(Debug)]
pub struct FallbackReport {
    /// One entry per candidate actually called, in call order.
    pub attempts: Vec<DispatchOutcome>,
    pub result: Result<ChatReply, ChatError>,
}

impl ModelFallback {
    pub fn new(provider: Arc<dyn Provider>, candidates: Vec<String>) -> Self {
        Self {
            provider,
            candidates,
            timeout: DEFAULT_DISPATCH_TIMEOUT,
            usage: Arc::new(NoopUsageSink),
        }
    }

    /// Bound each upstream call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Report every attempt to `usage`.
    pub fn with_usage_sink(mut self, usage: Arc<dyn UsageSink>) -> Self {
        self.usage = usage;
        self
    }

    /// The configured candidate models, in priority order.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Try candidates until one succeeds, a fatal failure occurs, or the
    /// queue is exhausted.
    ///
    /// Dropping the returned future abandons the loop: no further
    /// candidate is contacted.
    pub async fn run(&self, prompt: &PromptPayload, caller: &str) -> FallbackReport {
        let mut queue: VecDeque<&str> = self.candidates.iter().map(String::as_str).collect();
        let mut attempts = Vec::with_capacity(queue.len());
        let mut last_error: Option<ProviderError> = None;
        let total = queue.len();

        while let Some(model) = queue.pop_front() {
            info!(
                provider = %self.provider.name(),
                model = %model,
                attempt = attempts.len() + 1,
                total,
                caller = %caller,
                "Fallback: trying model"
            );

            let result = self.dispatch(model, prompt).await;
            attempts.push(DispatchOutcome::from_result(model, &result));

            match result {
                Ok(generation) => {
                    self.usage
                        .record(UsageRecord::now(caller, model, UsageStatus::Success));
                    return FallbackReport {
                        attempts,
                        result: Ok(ChatReply {
                            text: generation.text,
                            model: model.to_string(),
                        }),
                    };
                }
                Err(e) => {
                    self.usage
                        .record(UsageRecord::now(caller, model, UsageStatus::Error));

                    if !e.is_retryable() {
                        warn!(
                            model = %model,
                            error = %e,
                            "Fallback: fatal failure, aborting"
                        );
                        return FallbackReport {
                            attempts,
                            result: Err(ChatError::Upstream(e)),
                        };
                    }

                    warn!(
                        model = %model,
                        error = %e,
                        remaining = queue.len(),
                        "Fallback: model failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        let result = match last_error {
            Some(last) => Err(ChatError::Exhausted {
                attempts: attempts.len(),
                last,
            }),
            None => Err(ChatError::Upstream(ProviderError::NotConfigured(
                "no candidate models configured".into(),
            ))),
        };

        FallbackReport { attempts, result }
    }

    /// Run and keep only the final result.
    pub async fn complete(
        &self,
        prompt: &PromptPayload,
        caller: &str,
    ) -> Result<ChatReply, ChatError> {
        self.run(prompt, caller).await.result
    }

    async fn dispatch(
        &self,
        model: &str,
        prompt: &PromptPayload,
    ) -> Result<Generation, ProviderError> {
        match tokio::time::timeout(self.timeout, self.provider.generate(model, prompt)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "'{}' did not answer within {}s",
                model,
                self.timeout.as_secs_f32()
            ))),
        }
    }
}
