//! Binary toxic/obscene classifier (Hugging Face inference API).

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use echo_types::api::ModerationVerdict;

use crate::backend::ModerationBackend;

/// Toxic-label score above which a text is toxic.
const TOXIC_THRESHOLD: f64 = 0.7;
/// Obscene-label score above which a text is explicit. Higher than the toxic
/// bar: only very confident obscenity overrides the keyword layer.
const OBSCENE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

/// The API answers with either `[[{label, score}, ...]]` or `[{label, score}, ...]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifierResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl ClassifierResponse {
    fn into_scores(self) -> Vec<LabelScore> {
        match self {
            Self::Nested(outer) => outer.into_iter().next().unwrap_or_default(),
            Self::Flat(scores) => scores,
        }
    }
}

pub struct HfToxicityClassifier {
    token: String,
    url: String,
    http: reqwest::Client,
}

impl HfToxicityClassifier {
    pub fn new(token: String, url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { token, url, http })
    }
}

/// Fold label scores over the keyword baseline.
fn verdict_from_scores(scores: &[LabelScore], baseline: ModerationVerdict) -> ModerationVerdict {
    let label_score = |wanted: &[&str]| {
        scores
            .iter()
            .find(|s| wanted.contains(&s.label.as_str()))
            .map_or(0.0, |s| s.score)
    };

    let toxic = label_score(&["toxic", "identity_hate"]);
    let obscene = label_score(&["obscene"]);

    ModerationVerdict {
        is_toxic: toxic > TOXIC_THRESHOLD,
        is_explicit: baseline.is_explicit || obscene > OBSCENE_THRESHOLD,
        score: toxic.max(obscene),
    }
}

#[async_trait]
impl ModerationBackend for HfToxicityClassifier {
    fn name(&self) -> &'static str {
        "toxicity-classifier"
    }

    async fn classify(&self, text: &str, baseline: ModerationVerdict) -> Result<ModerationVerdict> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&json!({ "inputs": text }))
            .send()
            .await
            .context("Classifier request failed")?;

        if !response.status().is_success() {
            bail!("Classifier returned {}", response.status());
        }

        let parsed: ClassifierResponse = response
            .json()
            .await
            .context("Failed to parse classifier response")?;
        let scores = parsed.into_scores();
        debug!("Classifier returned {} labels", scores.len());

        Ok(verdict_from_scores(&scores, baseline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(json: &str) -> Vec<LabelScore> {
        serde_json::from_str::<ClassifierResponse>(json).unwrap().into_scores()
    }

    #[test]
    fn nested_and_flat_shapes() {
        let nested = scores(r#"[[{"label":"toxic","score":0.9},{"label":"obscene","score":0.1}]]"#);
        let flat = scores(r#"[{"label":"toxic","score":0.9},{"label":"obscene","score":0.1}]"#);
        assert_eq!(nested.len(), 2);
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn thresholds() {
        let s = scores(r#"[{"label":"toxic","score":0.75},{"label":"obscene","score":0.78}]"#);
        let v = verdict_from_scores(&s, ModerationVerdict::default());
        assert!(v.is_toxic);
        assert!(!v.is_explicit);
        assert_eq!(v.score, 0.78);

        let s = scores(r#"[{"label":"toxic","score":0.2},{"label":"obscene","score":0.85}]"#);
        let v = verdict_from_scores(&s, ModerationVerdict::default());
        assert!(!v.is_toxic);
        assert!(v.is_explicit);
    }

    #[test]
    fn keyword_explicit_survives_low_obscene_score() {
        let baseline = ModerationVerdict {
            is_toxic: false,
            is_explicit: true,
            score: 0.9,
        };
        let s = scores(r#"[{"label":"obscene","score":0.01}]"#);
        assert!(verdict_from_scores(&s, baseline).is_explicit);
    }

    #[test]
    fn identity_hate_counts_as_toxic() {
        let s = scores(r#"[{"label":"identity_hate","score":0.95}]"#);
        assert!(verdict_from_scores(&s, ModerationVerdict::default()).is_toxic);
    }
}
