//! Pure reducers from raw rows to view state.
//!
//! Views are always recomputed from the full row set of a scope rather than
//! patched incrementally, so a missed or reordered change event can never
//! leave a count drifting.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::display_name;
use crate::models::{EchoThread, MessageReaction, Poll, PollVote, ThreadMessage, Vault};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub count: usize,
    pub has_reacted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: ThreadMessage,
    pub author: String,
    pub reactions: ReactionSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollView {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    /// Vote count per option, indexed like `options`.
    pub votes: Vec<usize>,
    pub my_vote: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadView {
    pub messages: Vec<MessageView>,
    pub polls: Vec<PollView>,
}

/// Raw rows of one thread, as loaded from the store.
#[derive(Debug, Clone, Default)]
pub struct ThreadRows {
    pub messages: Vec<ThreadMessage>,
    pub reactions: Vec<MessageReaction>,
    pub polls: Vec<Poll>,
    pub votes: Vec<PollVote>,
}

/// Derive the thread view for `viewer` (a participant key), or for an
/// anonymous observer when `viewer` is `None`.
pub fn derive_thread_view(rows: &ThreadRows, viewer: Option<&str>) -> ThreadView {
    let mut messages: Vec<&ThreadMessage> = rows.messages.iter().collect();
    // Stable: equal timestamps keep store order.
    messages.sort_by_key(|m| m.created_at);

    // Distinct identities per message, even if duplicate rows slipped in.
    let mut reactors: HashMap<Uuid, HashSet<&str>> = HashMap::new();
    for r in &rows.reactions {
        reactors
            .entry(r.message_id)
            .or_default()
            .insert(r.anon_hash.as_str());
    }

    let messages = messages
        .into_iter()
        .map(|m| {
            let reactions = reactors
                .get(&m.id)
                .map(|set| ReactionSummary {
                    count: set.len(),
                    has_reacted: viewer.is_some_and(|v| set.contains(v)),
                })
                .unwrap_or_default();

            MessageView {
                message: m.clone(),
                author: display_name(&m.anon_hash),
                reactions,
            }
        })
        .collect();

    let polls = rows
        .polls
        .iter()
        .map(|p| derive_poll_view(p, &rows.votes, viewer))
        .collect();

    ThreadView { messages, polls }
}

fn derive_poll_view(poll: &Poll, votes: &[PollVote], viewer: Option<&str>) -> PollView {
    let mut poll_votes: Vec<&PollVote> = votes.iter().filter(|v| v.poll_id == poll.id).collect();
    poll_votes.sort_by_key(|v| v.created_at);

    // One active vote per identity; the latest row wins.
    let mut by_identity: HashMap<&str, usize> = HashMap::new();
    for v in poll_votes {
        if v.option_index < poll.options.len() {
            by_identity.insert(v.anon_hash.as_str(), v.option_index);
        }
    }

    let mut tally = vec![0usize; poll.options.len()];
    for &option in by_identity.values() {
        tally[option] += 1;
    }

    PollView {
        id: poll.id,
        question: poll.question.clone(),
        options: poll.options.clone(),
        votes: tally,
        my_vote: viewer.and_then(|v| by_identity.get(v).copied()),
    }
}

// -- Feeds --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    #[serde(flatten)]
    pub thread: EchoThread,
    pub vault_name: Option<String>,
    pub vault_icon: Option<String>,
    pub message_count: usize,
    pub last_message_at: Option<DateTime<Utc>>,
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedOrder {
    /// `last_activity_at` descending, newest message as tie-breaker.
    #[default]
    Activity,
    /// `created_at` descending.
    Created,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedFilter {
    pub include_private: bool,
    /// `Some(flag)` keeps only threads whose explicit flag equals `flag`.
    pub explicit: Option<bool>,
}

impl FeedFilter {
    fn admits(&self, thread: &EchoThread) -> bool {
        (self.include_private || thread.visibility.is_public())
            && self.explicit.is_none_or(|flag| thread.is_explicit == flag)
    }
}

pub fn derive_feed(
    threads: &[EchoThread],
    messages: &[ThreadMessage],
    vaults: &[Vault],
    filter: FeedFilter,
    order: FeedOrder,
) -> Vec<FeedEntry> {
    let vaults: HashMap<Uuid, &Vault> = vaults.iter().map(|v| (v.id, v)).collect();

    let mut by_thread: HashMap<Uuid, Vec<&ThreadMessage>> = HashMap::new();
    for m in messages {
        by_thread.entry(m.thread_id).or_default().push(m);
    }

    let mut entries: Vec<FeedEntry> = threads
        .iter()
        .filter(|t| filter.admits(t))
        .map(|t| {
            let mut msgs = by_thread.remove(&t.id).unwrap_or_default();
            msgs.sort_by_key(|m| m.created_at);
            let vault = vaults.get(&t.vault_id);

            FeedEntry {
                thread: t.clone(),
                vault_name: vault.map(|v| v.name.clone()),
                vault_icon: vault.map(|v| v.icon.clone()),
                message_count: msgs.len(),
                last_message_at: msgs.last().map(|m| m.created_at),
                preview: msgs.first().map(|m| m.content.clone()),
            }
        })
        .collect();

    match order {
        FeedOrder::Activity => entries.sort_by(|a, b| {
            b.thread
                .last_activity_at
                .cmp(&a.thread.last_activity_at)
                .then_with(|| b.last_message_at.cmp(&a.last_message_at))
        }),
        FeedOrder::Created => entries.sort_by(|a, b| b.thread.created_at.cmp(&a.thread.created_at)),
    }

    entries
}
