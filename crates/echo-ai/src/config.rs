use std::time::Duration;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_HF_URL: &str = "https://api-inference.huggingface.co/models/unitary/toxic-bert";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Backend credentials and endpoints. A missing credential disables that
/// backend; it is not an error.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub openai_key: Option<String>,
    pub openai_url: String,
    pub openai_model: String,
    pub hf_token: Option<String>,
    pub hf_url: String,
    pub timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            openai_key: None,
            openai_url: DEFAULT_OPENAI_URL.into(),
            openai_model: DEFAULT_OPENAI_MODEL.into(),
            hf_token: None,
            hf_url: DEFAULT_HF_URL.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl AiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            openai_key: non_empty_var("OPENAI_API_KEY"),
            openai_url: non_empty_var("ECHO_OPENAI_URL").unwrap_or(defaults.openai_url),
            openai_model: non_empty_var("ECHO_OPENAI_MODEL").unwrap_or(defaults.openai_model),
            hf_token: non_empty_var("HF_TOKEN").or_else(|| non_empty_var("HUGGING_FACE_TOKEN")),
            hf_url: non_empty_var("ECHO_HF_URL").unwrap_or(defaults.hf_url),
            timeout: non_empty_var("ECHO_BACKEND_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
