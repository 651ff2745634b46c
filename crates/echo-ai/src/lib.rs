//! Content moderation, echo matching and title synthesis.
//!
//! Every component runs an ordered fallback chain: an optional external
//! backend first, then a deterministic strategy that cannot fail. Backend
//! errors, timeouts and malformed responses are logged and swallowed; callers
//! never see them.

pub mod backend;
pub mod config;
pub mod huggingface;
pub mod matcher;
pub mod moderation;
pub mod openai;
pub mod title;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::backend::{CompletionBackend, ModerationBackend};
use crate::config::AiConfig;
use crate::huggingface::HfToxicityClassifier;
use crate::matcher::Matcher;
use crate::moderation::{Moderator, SemanticModeration};
use crate::openai::OpenAiClient;
use crate::title::TitleSynthesizer;

/// The three pipeline components, sharing one set of configured backends.
pub struct EchoAi {
    pub moderator: Moderator,
    pub matcher: Matcher,
    pub titles: TitleSynthesizer,
}

impl EchoAi {
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let completion: Option<Arc<dyn CompletionBackend>> = match &config.openai_key {
            Some(key) => Some(Arc::new(OpenAiClient::new(
                key.clone(),
                config.openai_url.clone(),
                config.openai_model.clone(),
                config.timeout,
            )?)),
            None => None,
        };

        // The semantic layer takes precedence; the classifier is consulted
        // only when no completion backend is configured.
        let moderation: Option<Arc<dyn ModerationBackend>> = match (&completion, &config.hf_token) {
            (Some(c), _) => Some(Arc::new(SemanticModeration::new(c.clone()))),
            (None, Some(token)) => Some(Arc::new(HfToxicityClassifier::new(
                token.clone(),
                config.hf_url.clone(),
                config.timeout,
            )?)),
            (None, None) => None,
        };

        info!(
            "AI backends: completion={}, moderation={}",
            completion.as_ref().map_or("none", |b| b.name()),
            moderation.as_ref().map_or("keywords only", |b| b.name()),
        );

        Ok(Self::with_backends(completion, moderation))
    }

    pub fn with_backends(
        completion: Option<Arc<dyn CompletionBackend>>,
        moderation: Option<Arc<dyn ModerationBackend>>,
    ) -> Self {
        Self {
            moderator: Moderator::new(moderation),
            matcher: Matcher::new(completion.clone()),
            titles: TitleSynthesizer::new(completion),
        }
    }

    /// Deterministic fallbacks only.
    pub fn offline() -> Self {
        Self::with_backends(None, None)
    }
}
