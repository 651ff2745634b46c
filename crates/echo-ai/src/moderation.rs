//! Moderation pipeline: keyword layer, then at most one external layer.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use echo_types::api::ModerationVerdict;

use crate::backend::{CompletionBackend, CompletionRequest, ModerationBackend};

/// Case-insensitive substrings that mark a text as explicit.
pub const KEYWORDS: &[&str] = &[
    "nsfw",
    "sex",
    "nude",
    "naked",
    "xxx",
    "porn",
    "murder",
    "kill",
    "suicide",
    "cock",
    "dick",
    "pussy",
    "vagina",
    "boobs",
    "tits",
    "anal",
    "bdsm",
    "fetish",
    "cum",
    "orgasm",
    "penetration",
    "fuck",
    "shit",
    "bitch",
];

const KEYWORD_SCORE: f64 = 0.9;

/// The keyword layer. Never marks a text toxic.
pub fn keyword_verdict(text: &str) -> ModerationVerdict {
    let lowered = text.to_lowercase();
    let is_explicit = KEYWORDS.iter().any(|k| lowered.contains(k));
    ModerationVerdict {
        is_toxic: false,
        is_explicit,
        score: if is_explicit { KEYWORD_SCORE } else { 0.0 },
    }
}

/// Runs the keyword layer and refines it with the configured backend, if any.
pub struct Moderator {
    backend: Option<Arc<dyn ModerationBackend>>,
}

impl Moderator {
    pub fn new(backend: Option<Arc<dyn ModerationBackend>>) -> Self {
        Self { backend }
    }

    /// Never fails: backend errors degrade to the keyword verdict.
    pub async fn classify(&self, text: &str) -> ModerationVerdict {
        let baseline = keyword_verdict(text);

        let Some(backend) = &self.backend else {
            return baseline;
        };

        match backend.classify(text, baseline).await {
            Ok(verdict) => {
                debug!(
                    "{} verdict: toxic={} explicit={} score={:.2}",
                    backend.name(),
                    verdict.is_toxic,
                    verdict.is_explicit,
                    verdict.score
                );
                // Keyword hits cannot be cleared by a backend.
                ModerationVerdict {
                    is_explicit: verdict.is_explicit || baseline.is_explicit,
                    ..verdict
                }
            }
            Err(e) => {
                warn!("{} moderation failed, using keyword verdict: {:#}", backend.name(), e);
                baseline
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SemanticVerdict {
    toxic: bool,
    #[serde(default)]
    explicit: bool,
    score: f64,
}

/// Structured verdict requested from a completion backend.
pub struct SemanticModeration {
    completion: Arc<dyn CompletionBackend>,
}

impl SemanticModeration {
    pub fn new(completion: Arc<dyn CompletionBackend>) -> Self {
        Self { completion }
    }

    fn prompt(text: &str) -> String {
        format!(
            "Analyze this text: {text:?}\n\
             Return JSON: {{\"toxic\": boolean, \"explicit\": boolean, \"score\": number (0-1)}}\n\
             \"explicit\" means sexual, NSFW, or extreme violence.\n\
             \"toxic\" means hate speech, bullying, or harassment."
        )
    }
}

#[async_trait]
impl ModerationBackend for SemanticModeration {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn classify(&self, text: &str, baseline: ModerationVerdict) -> Result<ModerationVerdict> {
        let mut request = CompletionRequest::new(Self::prompt(text), 0.0);
        request.json_object = true;

        let answer = self.completion.complete(&request).await?;
        let parsed: SemanticVerdict =
            serde_json::from_str(&answer).context("Malformed moderation verdict")?;

        let score = if parsed.score.is_finite() {
            parsed.score.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(ModerationVerdict {
            is_toxic: parsed.toxic,
            is_explicit: parsed.explicit || baseline.is_explicit,
            score,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;

    /// Completion backend that replays a script of answers; `None` entries
    /// fail.
    pub(crate) struct ScriptedCompletion {
        answers: Mutex<Vec<Option<String>>>,
        pub(crate) prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCompletion {
        pub(crate) fn new(answers: Vec<Option<&str>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into_iter().rev().map(|a| a.map(String::from)).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedCompletion {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            match self.answers.lock().unwrap().pop().flatten() {
                Some(answer) => Ok(answer),
                None => bail!("backend unavailable"),
            }
        }
    }

    fn semantic(answers: Vec<Option<&str>>) -> Moderator {
        Moderator::new(Some(Arc::new(SemanticModeration::new(ScriptedCompletion::new(answers)))))
    }

    #[test]
    fn keyword_layer() {
        let v = keyword_verdict("I posted a NUDE photo");
        assert!(v.is_explicit);
        assert!(!v.is_toxic);
        assert_eq!(v.score, 0.9);

        let v = keyword_verdict("I miss my ex");
        assert!(!v.is_explicit);
        assert_eq!(v.score, 0.0);
    }

    #[test]
    fn keyword_layer_matches_substrings() {
        // "skill" contains "kill"
        assert!(keyword_verdict("my skill issue").is_explicit);
    }

    #[tokio::test]
    async fn no_backend_is_keyword_only() {
        let moderator = Moderator::new(None);
        assert_eq!(
            moderator.classify("sleeping naked").await,
            keyword_verdict("sleeping naked")
        );
    }

    #[tokio::test]
    async fn failing_backend_keeps_keyword_explicit() {
        let moderator = semantic(vec![None]);
        let v = moderator.classify("I sent a nude").await;
        assert!(v.is_explicit);
        assert!(!v.is_toxic);
        assert_eq!(v.score, 0.9);
    }

    #[tokio::test]
    async fn malformed_answer_falls_back() {
        let moderator = semantic(vec![Some("I think this is fine")]);
        assert_eq!(moderator.classify("hello").await, ModerationVerdict::default());
    }

    #[tokio::test]
    async fn semantic_verdict_replaces_toxic_and_score() {
        let moderator = semantic(vec![Some(r#"{"toxic": true, "explicit": false, "score": 0.95}"#)]);
        let v = moderator.classify("you are worthless").await;
        assert!(v.is_toxic);
        assert!(!v.is_explicit);
        assert_eq!(v.score, 0.95);
    }

    #[tokio::test]
    async fn semantic_cannot_clear_keyword_explicit() {
        let moderator = semantic(vec![Some(r#"{"toxic": false, "explicit": false, "score": 0.1}"#)]);
        let v = moderator.classify("porn addiction").await;
        assert!(v.is_explicit);
        assert_eq!(v.score, 0.1);
    }

    #[tokio::test]
    async fn out_of_range_score_is_clamped() {
        let moderator = semantic(vec![Some(r#"{"toxic": false, "explicit": true, "score": 7}"#)]);
        assert_eq!(moderator.classify("hmm").await.score, 1.0);
    }
}
