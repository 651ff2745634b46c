use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Confession, EchoThread, MessageReaction, Poll, PollVote, ThreadMessage};
use crate::view::{FeedEntry, ThreadView};

// -- Store change feed --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// The row carried by a change notification. For deletes this is the removed row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "row", rename_all = "snake_case")]
pub enum ChangeRecord {
    Confessions(Confession),
    EchoThreads(EchoThread),
    ThreadMessages(ThreadMessage),
    MessageReactions(MessageReaction),
    Polls(Poll),
    PollVotes(PollVote),
}

impl ChangeRecord {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Confessions(_) => "confessions",
            Self::EchoThreads(_) => "echo_threads",
            Self::ThreadMessages(_) => "thread_messages",
            Self::MessageReactions(_) => "message_reactions",
            Self::Polls(_) => "polls",
            Self::PollVotes(_) => "poll_votes",
        }
    }
}

/// A single store notification. `vault_id` / `thread_id` are resolved by the
/// store at emit time so observers can filter without a lookup (reaction and
/// vote rows do not carry a thread id themselves).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    #[serde(flatten)]
    pub record: ChangeRecord,
    pub vault_id: Option<Uuid>,
    pub thread_id: Option<Uuid>,
}

impl ChangeEvent {
    pub fn affects_thread(&self, thread_id: Uuid) -> bool {
        self.thread_id == Some(thread_id)
    }

    /// Vault feeds change when a thread is created or bumped, or a message lands.
    pub fn affects_vault(&self, vault_id: Uuid) -> bool {
        self.vault_id == Some(vault_id)
            && matches!(
                self.record,
                ChangeRecord::EchoThreads(_) | ChangeRecord::ThreadMessages(_)
            )
    }
}

// -- Gateway --

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Connection accepted
    Ready { connection_id: Uuid },

    /// Recomputed view of a subscribed thread
    ThreadView { thread_id: Uuid, view: ThreadView },

    /// Recomputed feed of a subscribed vault
    VaultFeed { vault_id: Uuid, entries: Vec<FeedEntry> },

    /// A command could not be served
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Watch a thread. The viewer token scopes "my vote" / "have I reacted".
    SubscribeThread {
        thread_id: Uuid,
        viewer_token: Option<String>,
    },

    /// Watch a vault's thread feed.
    SubscribeVault {
        vault_id: Uuid,
        #[serde(default)]
        include_private: bool,
    },

    UnsubscribeThread { thread_id: Uuid },

    UnsubscribeVault { vault_id: Uuid },
}
