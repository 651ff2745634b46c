use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    /// Visible to signed-in viewers only.
    Private,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        matches!(self, Self::Public)
    }

    pub fn from_public_flag(is_public: bool) -> Self {
        if is_public { Self::Public } else { Self::Private }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub id: Uuid,
    pub name: String,
    pub icon: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// An anonymous submission. Never mutated after insert apart from
/// moderation-derived flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confession {
    pub id: Uuid,
    pub vault_id: Uuid,
    pub title: Option<String>,
    pub content: String,
    pub mood: String,
    pub visibility: Visibility,
    pub owner_id: Option<String>,
    pub anon_hash: String,
    pub is_explicit: bool,
    pub created_at: DateTime<Utc>,
}

/// A discussion thread seeded by one confession and its matched companions.
/// `last_activity_at` is the only field that changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoThread {
    pub id: Uuid,
    pub vault_id: Uuid,
    pub title: String,
    pub visibility: Visibility,
    pub is_explicit: bool,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Append-only. Ordered by `created_at` ascending within a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub confession_id: Option<Uuid>,
    pub content: String,
    pub anon_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Unique per (message_id, anon_hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReaction {
    pub message_id: Uuid,
    pub anon_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Unique per (poll_id, anon_hash). Re-voting replaces the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollVote {
    pub poll_id: Uuid,
    pub anon_hash: String,
    pub option_index: usize,
    pub created_at: DateTime<Utc>,
}
