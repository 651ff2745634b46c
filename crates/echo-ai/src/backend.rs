//! Capability interfaces for external backends.

use anyhow::Result;
use async_trait::async_trait;

use echo_types::api::ModerationVerdict;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the backend to answer with a JSON object.
    pub json_object: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            max_tokens: None,
            json_object: false,
        }
    }
}

/// `complete(prompt) -> text`
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Any error (network, timeout, non-success status, empty answer) makes
    /// the caller fall through to its deterministic strategy.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// An external moderation layer. `baseline` is the keyword-layer verdict
/// the layer refines.
#[async_trait]
pub trait ModerationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(&self, text: &str, baseline: ModerationVerdict) -> Result<ModerationVerdict>;
}
