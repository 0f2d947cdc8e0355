//! End-to-end handling of one chat request.

use crate::assembler::PromptAssembler;
use folio_core::error::{ChatError, MediaError};
use folio_core::prompt::NormalizedImage;
use folio_core::provider::Provider;
use folio_core::request::{ChatReply, ChatRequest};
use folio_core::sanitize::strip_markup;
use folio_core::usage::UsageSink;
use folio_media::MediaNormalizer;
use folio_providers::ModelFallback;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sanitizer, normalizer, assembler and fallback wired together.
pub struct ChatPipeline {
    assembler: PromptAssembler,
    media: MediaNormalizer,
    fallback: ModelFallback,
}

impl ChatPipeline {
    pub fn new(assembler: PromptAssembler, media: MediaNormalizer, fallback: ModelFallback) -> Self {
        Self {
            assembler,
            media,
            fallback,
        }
    }

    /// Build every stage from configuration around `provider`.
    pub fn from_config(
        config: &folio_config::AppConfig,
        provider: Arc<dyn Provider>,
        usage: Arc<dyn UsageSink>,
    ) -> Self {
        let fallback = ModelFallback::new(provider, config.models.clone())
            .with_timeout(config.dispatch_timeout())
            .with_usage_sink(usage);

        Self::new(
            PromptAssembler::from_config(config),
            MediaNormalizer::from_config(config),
            fallback,
        )
    }

    /// Candidate models in priority order.
    pub fn models(&self) -> &[String] {
        self.fallback.candidates()
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.media.max_input_bytes()
    }

    /// Run one request through every stage.
    ///
    /// A bad image never fails the request: it is dropped and the text
    /// continues alone. An oversized image is a client error.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let ChatRequest {
            text,
            image,
            caller,
        } = request;

        let text = strip_markup(&text);

        let image = match image {
            Some(bytes) => self.normalize(bytes, &caller).await?,
            None => None,
        };

        let prompt = self.assembler.build(&text, image).await?;

        debug!(
            caller = %caller,
            parts = prompt.parts().len(),
            has_media = prompt.has_media(),
            "Prompt assembled"
        );

        let reply = self.fallback.complete(&prompt, &caller).await?;

        info!(caller = %caller, model = %reply.model, "Chat reply generated");
        Ok(reply)
    }

    async fn normalize(
        &self,
        bytes: Vec<u8>,
        caller: &str,
    ) -> Result<Option<NormalizedImage>, ChatError> {
        match self.media.normalize(bytes).await {
            Ok(image) => Ok(Some(image)),
            Err(MediaError::TooLarge { size, limit }) => {
                Err(ChatError::PayloadTooLarge { size, limit })
            }
            Err(e) => {
                warn!(caller = %caller, error = %e, "Image unusable, continuing text-only");
                Ok(None)
            }
        }
    }
}
