//! Prompt assembly: persona, knowledge, user text and image combined into
//! one `PromptPayload`.
//!
//! The user turn is ordered: text part first, image part second.

use folio_core::error::ChatError;
use folio_core::persona::{KnowledgeBase, Persona};
use folio_core::prompt::{ContentPart, NormalizedImage, PromptPayload};

const KNOWLEDGE_HEADING: &str = "## Knowledge base";

pub struct PromptAssembler {
    persona: Persona,
    knowledge: KnowledgeBase,
}

impl PromptAssembler {
    pub fn new(persona: Persona, knowledge: KnowledgeBase) -> Self {
        Self { persona, knowledge }
    }

    pub fn from_config(config: &folio_config::AppConfig) -> Self {
        Self::new(
            Persona::load(&config.persona_paths()),
            KnowledgeBase::new(config.knowledge_path()),
        )
    }

    /// Persona text, followed by the knowledge section when there is one.
    pub fn system_instruction(&self, knowledge: Option<&str>) -> String {
        match knowledge.map(str::trim).filter(|k| !k.is_empty()) {
            Some(knowledge) => format!(
                "{}\n\n{KNOWLEDGE_HEADING}\n\n{knowledge}",
                self.persona.system_prompt
            ),
            None => self.persona.system_prompt.clone(),
        }
    }

    /// Combine the pieces. Whitespace-only text contributes no part; with
    /// no text and no image the request is rejected.
    pub fn assemble(
        &self,
        knowledge: Option<&str>,
        text: &str,
        image: Option<NormalizedImage>,
    ) -> Result<PromptPayload, ChatError> {
        let mut parts = Vec::with_capacity(2);

        let text = text.trim();
        if !text.is_empty() {
            parts.push(ContentPart::Text {
                text: text.to_string(),
            });
        }
        if let Some(image) = image {
            parts.push(image.into());
        }

        PromptPayload::new(self.system_instruction(knowledge), parts)
    }

    /// Re-read the knowledge file, then assemble.
    pub async fn build(
        &self,
        text: &str,
        image: Option<NormalizedImage>,
    ) -> Result<PromptPayload, ChatError> {
        let knowledge = self.knowledge.load().await;
        self.assemble(knowledge.as_deref(), text, image)
    }
}
