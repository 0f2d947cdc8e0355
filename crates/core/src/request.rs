//! Inbound chat request and outbound reply value objects.
//!
//! Visitor types a message → Gateway builds a `ChatRequest` → pipeline
//! produces a `ChatReply` naming the model that answered.

use serde::{Deserialize, Serialize};

/// One inbound chat call. Created per HTTP request, dropped when the
/// pipeline finishes.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Raw, unsanitized user text (may be empty).
    pub text: String,

    /// Raw uploaded image bytes, if any.
    pub image: Option<Vec<u8>>,

    /// Who is asking (source address or forwarded-for value).
    pub caller: String,
}

impl ChatRequest {
    /// A text-only request.
    pub fn text(text: impl Into<String>, caller: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
            caller: caller.into(),
        }
    }

    /// Attach raw image bytes.
    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }
}

/// The generated answer and the candidate model that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    pub model: String,
}
