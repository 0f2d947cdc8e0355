//! `POST /chat`: request extraction, the handler, and error responses.
//!
//! Accepts either JSON (`{"message": "...", "image": "<base64>"}`) or
//! `multipart/form-data` with a `message` field and an `image` (or `file`)
//! attachment. Upstream failure detail is logged, never returned.

use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Multipart, Request, State};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use folio_core::error::ChatError;
use folio_core::request::ChatRequest;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{Instrument, error, info_span, warn};
use uuid::Uuid;

use crate::SharedState;

const UNKNOWN_CALLER: &str = "unknown";

const PHRASE_EMPTY: &str = "Please type a message or attach an image.";
const PHRASE_MALFORMED: &str = "Sorry, I couldn't read that message. Please try again.";
const PHRASE_TOO_LARGE: &str = "That image is too large. Please upload a smaller one.";
const PHRASE_BUSY: &str = "I'm getting a lot of questions right now. Please try again in a minute.";
const PHRASE_FAILED: &str = "Sorry, something went wrong on my side. Please try again later.";

/// Response body for every chat outcome. `model` is present on success.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyBody {
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ReplyBody {
    pub fn failure(phrase: &str) -> Self {
        Self {
            reply: phrase.to_string(),
            model: None,
        }
    }
}

/// Who is calling: first `X-Forwarded-For` hop when trusted, else the
/// peer address, else `"unknown"`.
pub fn caller_identity(headers: &HeaderMap, extensions: &Extensions, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(first_hop) = forwarded {
            return first_hop.to_string();
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string())
}

/// Extractor wrapping `caller_identity`.
pub struct ClientIdentity(pub String);

impl FromRequestParts<SharedState> for ClientIdentity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(caller_identity(
            &parts.headers,
            &parts.extensions,
            state.trust_forwarded_for,
        )))
    }
}

/// JSON request body.
#[derive(Debug, Default, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    /// Base64 image, optionally as a `data:` URL.
    #[serde(default)]
    pub image: Option<String>,
}

/// The raw fields of a chat request, size-checked but otherwise untouched.
#[derive(Debug)]
pub struct ChatInput {
    pub text: String,
    pub image: Option<Vec<u8>>,
}

impl ChatBody {
    fn into_input(self, limit: usize) -> Result<ChatInput, ApiError> {
        let text = self.message.unwrap_or_default();

        let encoded = self
            .image
            .as_deref()
            .map(strip_data_url)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let Some(encoded) = encoded else {
            return Ok(ChatInput { text, image: None });
        };

        let estimated = encoded.len() / 4 * 3;
        if estimated > limit.saturating_add(3) {
            return Err(ChatError::PayloadTooLarge {
                size: estimated,
                limit,
            }
            .into());
        }

        let image = match BASE64.decode(encoded) {
            Ok(bytes) if bytes.len() > limit => {
                return Err(ChatError::PayloadTooLarge {
                    size: bytes.len(),
                    limit,
                }
                .into());
            }
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "Image field is not valid base64, ignoring it");
                None
            }
        };

        Ok(ChatInput { text, image })
    }
}

fn strip_data_url(value: &str) -> &str {
    match value.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
        Some((_, payload)) => payload,
        None => value,
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

impl FromRequest<SharedState> for ChatInput {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &SharedState) -> Result<Self, Self::Rejection> {
        let limit = state.max_upload_bytes;

        if is_multipart(req.headers()) {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::malformed(e.status(), e.body_text()))?;
            read_multipart(multipart, limit).await
        } else {
            let Json(body) = Json::<ChatBody>::from_request(req, state)
                .await
                .map_err(|e| ApiError::malformed(e.status(), e.body_text()))?;
            body.into_input(limit)
        }
    }
}

/// Collect `message` and the image attachment, stopping as soon as the
/// attachment passes `limit`.
async fn read_multipart(mut multipart: Multipart, limit: usize) -> Result<ChatInput, ApiError> {
    let field_error = |e: axum::extract::multipart::MultipartError| {
        ApiError::malformed(e.status(), e.body_text())
    };

    let mut text = String::new();
    let mut image = None;

    while let Some(mut field) = multipart.next_field().await.map_err(field_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("message") => text = field.text().await.map_err(field_error)?,
            Some("image") | Some("file") => {
                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(field_error)? {
                    let size = bytes.len() + chunk.len();
                    if size > limit {
                        return Err(ChatError::PayloadTooLarge { size, limit }.into());
                    }
                    bytes.extend_from_slice(&chunk);
                }
                // Browsers send an empty part when no file was chosen.
                if !bytes.is_empty() {
                    image = Some(bytes);
                }
            }
            _ => {}
        }
    }

    Ok(ChatInput { text, image })
}

/// Error returned by the chat handler.
#[derive(Debug)]
pub enum ApiError {
    /// The body could not be read at all.
    Malformed { status: StatusCode, detail: String },
    Chat(ChatError),
}

impl ApiError {
    fn malformed(status: StatusCode, detail: String) -> Self {
        Self::Malformed { status, detail }
    }

    fn status_and_phrase(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Malformed { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                (StatusCode::PAYLOAD_TOO_LARGE, PHRASE_TOO_LARGE)
            }
            Self::Malformed { .. } => (StatusCode::BAD_REQUEST, PHRASE_MALFORMED),
            Self::Chat(ChatError::InvalidRequest(_)) => (StatusCode::BAD_REQUEST, PHRASE_EMPTY),
            Self::Chat(ChatError::PayloadTooLarge { .. }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, PHRASE_TOO_LARGE)
            }
            Self::Chat(ChatError::Exhausted { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, PHRASE_BUSY)
            }
            Self::Chat(ChatError::Upstream(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, PHRASE_FAILED)
            }
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self::Chat(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, phrase) = self.status_and_phrase();

        match &self {
            Self::Malformed { detail, .. } => {
                warn!(status = status.as_u16(), detail = %detail, "Unreadable chat request")
            }
            Self::Chat(e) if e.is_client_error() => {
                warn!(status = status.as_u16(), error = %e, "Chat request rejected")
            }
            Self::Chat(e) => error!(status = status.as_u16(), error = %e, "Chat request failed"),
        }

        (status, Json(ReplyBody::failure(phrase))).into_response()
    }
}

/// `POST /chat` and `POST /api/chat`.
pub async fn chat_handler(
    State(state): State<SharedState>,
    ClientIdentity(caller): ClientIdentity,
    input: ChatInput,
) -> Result<Json<ReplyBody>, ApiError> {
    let span = info_span!(
        "chat",
        request_id = %Uuid::new_v4(),
        caller = %caller,
        has_image = input.image.is_some()
    );

    let request = ChatRequest {
        text: input.text,
        image: input.image,
        caller,
    };

    let reply = state.pipeline.handle(request).instrument(span).await?;

    Ok(Json(ReplyBody {
        reply: reply.text,
        model: Some(reply.model),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_used_only_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));

        assert_eq!(caller_identity(&headers, &extensions, true), "203.0.113.9");
        assert_eq!(caller_identity(&headers, &extensions, false), "192.0.2.1");
        assert_eq!(
            caller_identity(&HeaderMap::new(), &Extensions::new(), true),
            "unknown"
        );
    }

    #[test]
    fn data_url_prefix_stripped() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("AAAA"), "AAAA");
    }

    #[test]
    fn oversized_base64_rejected_before_decoding() {
        let body = ChatBody {
            message: Some("hi".into()),
            image: Some("A".repeat(4000)),
        };
        let err = body.into_input(100).unwrap_err();
        assert_eq!(err.status_and_phrase().0, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn invalid_base64_dropped() {
        let body = ChatBody {
            message: Some("hi".into()),
            image: Some("***not base64***".into()),
        };
        let input = body.into_input(1024).unwrap();
        assert_eq!(input.text, "hi");
        assert!(input.image.is_none());
    }

    #[test]
    fn error_phrases_do_not_leak_detail() {
        let err = ApiError::from(ChatError::Upstream(
            folio_core::error::ProviderError::AuthenticationFailed("key AIza-secret".into()),
        ));
        let (status, phrase) = err.status_and_phrase();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!phrase.contains("AIza"));
    }
}
