//! Upstream-ready prompt structure.
//!
//! A `PromptPayload` is built once per request by the assembler and handed
//! to the fallback orchestrator, which only ever reads it.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// A re-encoded image ready for inline upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// One part of the user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    InlineMedia { data: Vec<u8>, mime_type: String },
}

impl ContentPart {
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    pub fn is_media(&self) -> bool {
        matches!(self, Self::InlineMedia { .. })
    }
}

impl From<NormalizedImage> for ContentPart {
    fn from(image: NormalizedImage) -> Self {
        Self::InlineMedia {
            data: image.bytes,
            mime_type: image.mime_type,
        }
    }
}

/// System instruction plus the ordered content parts of the user turn.
///
/// Always holds at least one content part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    system_instruction: String,
    parts: Vec<ContentPart>,
}

impl PromptPayload {
    /// Build a payload, rejecting an empty part list.
    pub fn new(
        system_instruction: impl Into<String>,
        parts: Vec<ContentPart>,
    ) -> Result<Self, ChatError> {
        if parts.is_empty() {
            return Err(ChatError::InvalidRequest(
                "message must contain text or an image".into(),
            ));
        }
        Ok(Self {
            system_instruction: system_instruction.into(),
            parts,
        })
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    pub fn has_media(&self) -> bool {
        self.parts.iter().any(ContentPart::is_media)
    }
}
