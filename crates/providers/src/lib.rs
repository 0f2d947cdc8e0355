//! Upstream model client and fallback orchestration for Folio.
//!
//! `GeminiProvider` implements the `folio_core::Provider` trait against the
//! Gemini REST API. `ModelFallback` walks an ordered list of candidate
//! models over any `Provider`.

pub mod fallback;
pub mod gemini;

pub use fallback::{FallbackReport, ModelFallback, DEFAULT_DISPATCH_TIMEOUT};
pub use gemini::GeminiProvider;
