use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EchoThread, Visibility};
use crate::view::ThreadView;

// -- Moderation --

/// Advisory classification of a text. The caller decides whether to block
/// (toxic) or tag (explicit).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
    pub is_toxic: bool,
    pub is_explicit: bool,
    /// 0.0 ..= 1.0
    pub score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModerationCheckRequest {
    #[serde(alias = "content")]
    pub text: String,
}

// -- Confessions --

fn default_mood() -> String {
    "😐".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitConfessionRequest {
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    pub vault_id: Uuid,
    #[serde(default = "default_mood")]
    pub mood: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Per-device token. When absent a fresh pseudonym is minted for this
    /// submission.
    #[serde(default)]
    pub device_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitConfessionResponse {
    pub thread_id: Uuid,
    pub confession_id: Uuid,
    pub title: String,
    pub is_explicit: bool,
}

// -- Threads --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    pub device_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread: EchoThread,
    pub view: ThreadView,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactRequest {
    pub device_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReactResponse {
    /// false when this identity had already reacted
    pub added: bool,
}

// -- Polls --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub device_token: String,
    pub option_index: usize,
}
