//! # Folio Core
//!
//! Domain types, traits, and error definitions for the Folio portfolio
//! chatbot service. This crate has **no HTTP or upstream-client
//! dependencies**. It defines the model every other crate builds on.
//!
//! ## Design Philosophy
//!
//! Seams are traits defined here (`Provider`, `UsageSink`); implementations
//! live in their own crates. Tests substitute scripted providers and
//! in-memory sinks without touching the network or the filesystem.

pub mod error;
pub mod persona;
pub mod prompt;
pub mod provider;
pub mod request;
pub mod sanitize;
pub mod usage;

// Re-export key types at crate root for ergonomics
pub use error::{ChatError, FailureKind, MediaError, ProviderError, Result};
pub use persona::{KnowledgeBase, Persona, PersonaPaths, PersonaSource};
pub use prompt::{ContentPart, NormalizedImage, PromptPayload};
pub use provider::{DispatchOutcome, Generation, Provider};
pub use request::{ChatReply, ChatRequest};
pub use sanitize::strip_markup;
pub use usage::{NoopUsageSink, UsageRecord, UsageSink, UsageStatus};
