//! The chat pipeline for Folio.
//!
//! Sanitize → normalize media → assemble prompt → model fallback.

pub mod assembler;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use assembler::PromptAssembler;
pub use pipeline::ChatPipeline;
