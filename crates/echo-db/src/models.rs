//! Row mapping between SQLite and the echo-types models, plus the
//! parameter/result types of multi-row operations.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use echo_types::models::{
    Confession, EchoThread, MessageReaction, Poll, PollVote, ThreadMessage, Vault, Visibility,
};
use echo_types::view::{FeedFilter, FeedOrder};

pub(crate) const VAULT_COLUMNS: &str = "id, name, icon, description, created_at";

pub(crate) const CONFESSION_COLUMNS: &str =
    "id, vault_id, title, content, mood, is_public, owner_id, anon_hash, is_explicit, created_at";

pub(crate) const THREAD_COLUMNS: &str =
    "id, vault_id, title, is_public, is_explicit, owner_id, created_at, last_activity_at";

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, thread_id, confession_id, content, anon_hash, created_at";

pub(crate) const POLL_COLUMNS: &str = "id, thread_id, question, options, created_at";

/// A thread about to be created.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub vault_id: Uuid,
    pub title: String,
    pub visibility: Visibility,
    pub is_explicit: bool,
    pub owner_id: Option<String>,
}

/// Result of appending a message. `activity_bumped == false` means the
/// message is stored but the thread's `last_activity_at` is stale.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub message: ThreadMessage,
    pub activity_bumped: bool,
}

/// Thread listing parameters for feeds.
#[derive(Debug, Clone, Copy)]
pub struct ThreadQuery {
    pub vault_id: Option<Uuid>,
    pub filter: FeedFilter,
    pub order: FeedOrder,
    pub offset: u32,
    pub limit: u32,
}

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn uuid_col(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion_err(idx, e))
}

fn opt_uuid_col(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| s.parse().map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn ts_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

pub(crate) fn vault_from_row(row: &Row) -> rusqlite::Result<Vault> {
    Ok(Vault {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        icon: row.get(2)?,
        description: row.get(3)?,
        created_at: ts_col(row, 4)?,
    })
}

pub(crate) fn confession_from_row(row: &Row) -> rusqlite::Result<Confession> {
    Ok(Confession {
        id: uuid_col(row, 0)?,
        vault_id: uuid_col(row, 1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        mood: row.get(4)?,
        visibility: Visibility::from_public_flag(row.get(5)?),
        owner_id: row.get(6)?,
        anon_hash: row.get(7)?,
        is_explicit: row.get(8)?,
        created_at: ts_col(row, 9)?,
    })
}

pub(crate) fn thread_from_row(row: &Row) -> rusqlite::Result<EchoThread> {
    Ok(EchoThread {
        id: uuid_col(row, 0)?,
        vault_id: uuid_col(row, 1)?,
        title: row.get(2)?,
        visibility: Visibility::from_public_flag(row.get(3)?),
        is_explicit: row.get(4)?,
        owner_id: row.get(5)?,
        created_at: ts_col(row, 6)?,
        last_activity_at: ts_col(row, 7)?,
    })
}

pub(crate) fn message_from_row(row: &Row) -> rusqlite::Result<ThreadMessage> {
    Ok(ThreadMessage {
        id: uuid_col(row, 0)?,
        thread_id: uuid_col(row, 1)?,
        confession_id: opt_uuid_col(row, 2)?,
        content: row.get(3)?,
        anon_hash: row.get(4)?,
        created_at: ts_col(row, 5)?,
    })
}

pub(crate) fn reaction_from_row(row: &Row) -> rusqlite::Result<MessageReaction> {
    Ok(MessageReaction {
        message_id: uuid_col(row, 0)?,
        anon_hash: row.get(1)?,
        created_at: ts_col(row, 2)?,
    })
}

pub(crate) fn poll_from_row(row: &Row) -> rusqlite::Result<Poll> {
    let options: String = row.get(3)?;
    Ok(Poll {
        id: uuid_col(row, 0)?,
        thread_id: uuid_col(row, 1)?,
        question: row.get(2)?,
        options: serde_json::from_str(&options).map_err(|e| conversion_err(3, e))?,
        created_at: ts_col(row, 4)?,
    })
}

pub(crate) fn vote_from_row(row: &Row) -> rusqlite::Result<PollVote> {
    let option_index: i64 = row.get(2)?;
    Ok(PollVote {
        poll_id: uuid_col(row, 0)?,
        anon_hash: row.get(1)?,
        option_index: usize::try_from(option_index).map_err(|e| conversion_err(2, e))?,
        created_at: ts_col(row, 3)?,
    })
}
