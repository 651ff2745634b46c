use std::sync::Arc;

use tracing::warn;

use crate::backend::{CompletionBackend, CompletionRequest};

const FALLBACK_WORDS: usize = 4;

pub struct TitleSynthesizer {
    backend: Option<Arc<dyn CompletionBackend>>,
}

impl TitleSynthesizer {
    pub fn new(backend: Option<Arc<dyn CompletionBackend>>) -> Self {
        Self { backend }
    }

    /// A short thread title for `content`. Never fails.
    pub async fn title(&self, content: &str) -> String {
        if let Some(backend) = &self.backend {
            let prompt = format!(
                "Summarize this confession into a funny, catchy 3-5 word title for a chat thread.\n\
                 Confession: {content:?}\nTitle:"
            );
            let mut request = CompletionRequest::new(prompt, 0.5);
            request.max_tokens = Some(15);

            match backend.complete(&request).await {
                Ok(answer) => {
                    let title = strip_quotes(&answer);
                    if !title.is_empty() {
                        return title.to_string();
                    }
                }
                Err(e) => warn!("{} title synthesis failed: {:#}", backend.name(), e),
            }
        }

        fallback_title(content)
    }
}

fn strip_quotes(answer: &str) -> &str {
    answer
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”'))
        .trim()
}

/// First four words plus an ellipsis, or the content itself if shorter.
pub fn fallback_title(content: &str) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.len() <= FALLBACK_WORDS {
        return content.to_string();
    }
    format!("{}...", words[..FALLBACK_WORDS].join(" "))
}
