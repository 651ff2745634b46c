//! Echo thread aggregator: the async face of the store's thread writes and
//! the per-viewer view derivation.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use echo_db::Database;
use echo_db::models::{AppendOutcome, NewThread};
use echo_types::models::{Confession, EchoThread, Poll, PollVote, ThreadMessage};
use echo_types::view::{ThreadView, derive_thread_view};

use crate::state::blocking;

#[derive(Clone)]
pub struct ThreadAggregator {
    db: Arc<Database>,
}

impl ThreadAggregator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a thread from `seed` plus the matched confessions found in
    /// `pool`. Matches missing from the pool are dropped.
    pub async fn create(
        &self,
        new: NewThread,
        seed: Confession,
        matched: &[Uuid],
        pool: &[Confession],
    ) -> Result<(EchoThread, Vec<ThreadMessage>)> {
        let companions = resolve_companions(seed.id, matched, pool);
        blocking(&self.db, move |db| db.create_thread(&new, &seed, &companions)).await
    }

    pub async fn append(
        &self,
        thread_id: Uuid,
        content: String,
        anon_hash: String,
    ) -> Result<AppendOutcome> {
        blocking(&self.db, move |db| db.append_message(thread_id, &content, &anon_hash)).await
    }

    /// `None` if the message does not exist, `Some(false)` for a repeat.
    pub async fn react(&self, message_id: Uuid, anon_hash: String) -> Result<Option<bool>> {
        blocking(&self.db, move |db| db.react(message_id, &anon_hash)).await
    }

    pub async fn vote(&self, poll_id: Uuid, anon_hash: String, option_index: usize) -> Result<PollVote> {
        blocking(&self.db, move |db| db.vote(poll_id, &anon_hash, option_index)).await
    }

    pub async fn create_poll(
        &self,
        thread_id: Uuid,
        question: String,
        options: Vec<String>,
    ) -> Result<Poll> {
        blocking(&self.db, move |db| db.create_poll(thread_id, &question, &options)).await
    }

    pub async fn thread(&self, thread_id: Uuid) -> Result<Option<EchoThread>> {
        blocking(&self.db, move |db| db.get_thread(thread_id)).await
    }

    pub async fn poll(&self, poll_id: Uuid) -> Result<Option<Poll>> {
        blocking(&self.db, move |db| db.get_poll(poll_id)).await
    }

    /// The thread and its view for `viewer` (a participant key).
    pub async fn view(
        &self,
        thread_id: Uuid,
        viewer: Option<String>,
    ) -> Result<Option<(EchoThread, ThreadView)>> {
        blocking(&self.db, move |db| {
            let Some(thread) = db.get_thread(thread_id)? else {
                return Ok(None);
            };
            let rows = db.load_thread_rows(thread_id)?;
            Ok(Some((thread, derive_thread_view(&rows, viewer.as_deref()))))
        })
        .await
    }
}

/// Matched ids resolved against the candidate pool, in match order.
pub fn resolve_companions(seed_id: Uuid, matched: &[Uuid], pool: &[Confession]) -> Vec<Confession> {
    let mut seen = HashSet::from([seed_id]);
    matched
        .iter()
        .filter(|id| seen.insert(**id))
        .filter_map(|id| pool.iter().find(|c| c.id == *id))
        .cloned()
        .collect()
}
