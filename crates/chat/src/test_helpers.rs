//! Shared test helpers for pipeline tests.

use folio_core::error::ProviderError;
use folio_core::prompt::PromptPayload;
use folio_core::provider::{Generation, Provider};
use std::collections::HashMap;
use std::sync::Mutex;

/// A provider answering per model from a fixed script. Unscripted models
/// report `ModelNotFound`. Every call is recorded with the prompt it saw.
pub struct ScriptedProvider {
    scripts: HashMap<String, Result<String, ProviderError>>,
    calls: Mutex<Vec<(String, PromptPayload)>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<(&str, Result<&str, ProviderError>)>) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(model, result)| (model.to_string(), result.map(String::from)))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A single model that always answers `text`.
    pub fn answering(model: &str, text: &str) -> Self {
        Self::new(vec![(model, Ok(text))])
    }

    pub fn models_called(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn last_prompt(&self) -> Option<PromptPayload> {
        self.calls.lock().unwrap().last().map(|(_, p)| p.clone())
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &PromptPayload,
    ) -> Result<Generation, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.clone()));

        match self.scripts.get(model) {
            Some(Ok(text)) => Ok(Generation {
                text: text.clone(),
                model: model.to_string(),
            }),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ProviderError::ModelNotFound(model.to_string())),
        }
    }
}
