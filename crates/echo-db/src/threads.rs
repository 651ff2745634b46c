//! Echo thread writes and per-thread row loading.
//!
//! Every write publishes its committed rows on the change feed. Uniqueness of
//! reactions and votes is enforced by the schema's primary keys, never by
//! application sequencing.

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::warn;
use uuid::Uuid;

use echo_types::events::{ChangeEvent, ChangeKind, ChangeRecord};
use echo_types::models::{Confession, EchoThread, MessageReaction, Poll, PollVote, ThreadMessage};
use echo_types::view::ThreadRows;

use crate::Database;
use crate::models::{
    AppendOutcome, MESSAGE_COLUMNS, NewThread, POLL_COLUMNS, THREAD_COLUMNS, message_from_row,
    poll_from_row, reaction_from_row, thread_from_row, ts_to_sql, vote_from_row,
};

/// Current time at the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

impl Database {
    pub fn get_thread(&self, id: Uuid) -> Result<Option<EchoThread>> {
        self.with_conn(|conn| query_thread(conn, id))
    }

    pub fn get_poll(&self, id: Uuid) -> Result<Option<Poll>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM polls WHERE id = ?1", POLL_COLUMNS);
            let poll = conn
                .query_row(&sql, [id.to_string()], poll_from_row)
                .optional()?;
            Ok(poll)
        })
    }

    /// Create a thread seeded by `seed`, followed by one message per companion.
    /// Runs in a single transaction: either the thread and all of its seed
    /// messages exist, or none do.
    pub fn create_thread(
        &self,
        new: &NewThread,
        seed: &Confession,
        companions: &[Confession],
    ) -> Result<(EchoThread, Vec<ThreadMessage>)> {
        let created_at = now();
        let thread = EchoThread {
            id: Uuid::new_v4(),
            vault_id: new.vault_id,
            title: new.title.clone(),
            visibility: new.visibility,
            is_explicit: new.is_explicit,
            owner_id: new.owner_id.clone(),
            created_at,
            last_activity_at: created_at,
        };

        let messages: Vec<ThreadMessage> = std::iter::once(seed)
            .chain(companions)
            .map(|c| ThreadMessage {
                id: Uuid::new_v4(),
                thread_id: thread.id,
                confession_id: Some(c.id),
                content: c.content.clone(),
                anon_hash: c.anon_hash.clone(),
                created_at,
            })
            .collect();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO echo_threads
                    (id, vault_id, title, is_public, is_explicit, owner_id, created_at, last_activity_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    thread.id.to_string(),
                    thread.vault_id.to_string(),
                    thread.title,
                    thread.visibility.is_public(),
                    thread.is_explicit,
                    thread.owner_id,
                    ts_to_sql(&thread.created_at),
                    ts_to_sql(&thread.last_activity_at),
                ],
            )?;
            for m in &messages {
                insert_message(&tx, m)?;
            }
            tx.commit()?;
            Ok(())
        })?;

        let mut events = vec![ChangeEvent {
            kind: ChangeKind::Insert,
            vault_id: Some(thread.vault_id),
            thread_id: Some(thread.id),
            record: ChangeRecord::EchoThreads(thread.clone()),
        }];
        events.extend(messages.iter().map(|m| ChangeEvent {
            kind: ChangeKind::Insert,
            vault_id: Some(thread.vault_id),
            thread_id: Some(thread.id),
            record: ChangeRecord::ThreadMessages(m.clone()),
        }));
        self.publish(events);

        Ok((thread, messages))
    }

    /// Append a message, then bump the thread's `last_activity_at`.
    ///
    /// A failed bump is reported through `AppendOutcome::activity_bumped`
    /// rather than as an error: the message is already stored.
    pub fn append_message(
        &self,
        thread_id: Uuid,
        content: &str,
        anon_hash: &str,
    ) -> Result<AppendOutcome> {
        let message = ThreadMessage {
            id: Uuid::new_v4(),
            thread_id,
            confession_id: None,
            content: content.to_string(),
            anon_hash: anon_hash.to_string(),
            created_at: now(),
        };

        let (vault_id, bumped) = self.with_conn(|conn| {
            let vault_id = query_thread(conn, thread_id)?
                .map(|t| t.vault_id)
                .ok_or_else(|| anyhow!("Thread not found: {}", thread_id))?;

            insert_message(conn, &message)?;

            let bumped = match conn.execute(
                "UPDATE echo_threads SET last_activity_at = ?1 WHERE id = ?2",
                (ts_to_sql(&message.created_at), thread_id.to_string()),
            ) {
                Ok(_) => query_thread(conn, thread_id).unwrap_or_else(|e| {
                    warn!("Re-reading thread {} after bump failed: {}", thread_id, e);
                    None
                }),
                Err(e) => {
                    warn!("last_activity bump failed for thread {}: {}", thread_id, e);
                    None
                }
            };

            Ok((vault_id, bumped))
        })?;

        let mut events = vec![ChangeEvent {
            kind: ChangeKind::Insert,
            vault_id: Some(vault_id),
            thread_id: Some(thread_id),
            record: ChangeRecord::ThreadMessages(message.clone()),
        }];
        let activity_bumped = bumped.is_some();
        if let Some(thread) = bumped {
            events.push(ChangeEvent {
                kind: ChangeKind::Update,
                vault_id: Some(vault_id),
                thread_id: Some(thread_id),
                record: ChangeRecord::EchoThreads(thread),
            });
        }
        self.publish(events);

        Ok(AppendOutcome {
            message,
            activity_bumped,
        })
    }

    /// Record a reaction. Returns `Some(false)` if this identity had already
    /// reacted to the message, `None` if the message does not exist.
    pub fn react(&self, message_id: Uuid, anon_hash: &str) -> Result<Option<bool>> {
        let reaction = MessageReaction {
            message_id,
            anon_hash: anon_hash.to_string(),
            created_at: now(),
        };

        let outcome = self.with_conn(|conn| {
            let Some((thread_id, vault_id)) = message_scope(conn, message_id)? else {
                return Ok(None);
            };

            let inserted = conn.execute(
                "INSERT INTO message_reactions (message_id, anon_hash, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (message_id, anon_hash) DO NOTHING",
                (
                    message_id.to_string(),
                    &reaction.anon_hash,
                    ts_to_sql(&reaction.created_at),
                ),
            )?;

            Ok(Some((inserted == 1, thread_id, vault_id)))
        })?;

        let Some((added, thread_id, vault_id)) = outcome else {
            return Ok(None);
        };

        if added {
            self.publish(vec![ChangeEvent {
                kind: ChangeKind::Insert,
                vault_id: Some(vault_id),
                thread_id: Some(thread_id),
                record: ChangeRecord::MessageReactions(reaction),
            }]);
        }

        Ok(Some(added))
    }

    /// Replace this identity's vote on a poll: the prior row is deleted and
    /// the new one inserted in one transaction, so no history is retained and
    /// there is no window where the identity has zero votes.
    pub fn vote(&self, poll_id: Uuid, anon_hash: &str, option_index: usize) -> Result<PollVote> {
        let vote = PollVote {
            poll_id,
            anon_hash: anon_hash.to_string(),
            option_index,
            created_at: now(),
        };

        let (previous, thread_id, vault_id) = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let (options_len, thread_id, vault_id) = poll_scope(&tx, poll_id)?
                .ok_or_else(|| anyhow!("Poll not found: {}", poll_id))?;
            if option_index >= options_len {
                bail!(
                    "Option index {} out of range for poll {} ({} options)",
                    option_index,
                    poll_id,
                    options_len
                );
            }

            let previous = tx
                .query_row(
                    "SELECT poll_id, anon_hash, option_index, created_at FROM poll_votes
                     WHERE poll_id = ?1 AND anon_hash = ?2",
                    (poll_id.to_string(), anon_hash),
                    vote_from_row,
                )
                .optional()?;

            tx.execute(
                "DELETE FROM poll_votes WHERE poll_id = ?1 AND anon_hash = ?2",
                (poll_id.to_string(), anon_hash),
            )?;
            tx.execute(
                "INSERT INTO poll_votes (poll_id, anon_hash, option_index, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (
                    poll_id.to_string(),
                    anon_hash,
                    i64::try_from(option_index)?,
                    ts_to_sql(&vote.created_at),
                ),
            )?;
            tx.commit()?;

            Ok((previous, thread_id, vault_id))
        })?;

        let scope = |kind, record| ChangeEvent {
            kind,
            vault_id: Some(vault_id),
            thread_id: Some(thread_id),
            record,
        };
        let mut events = Vec::with_capacity(2);
        if let Some(prev) = previous {
            events.push(scope(ChangeKind::Delete, ChangeRecord::PollVotes(prev)));
        }
        events.push(scope(ChangeKind::Insert, ChangeRecord::PollVotes(vote.clone())));
        self.publish(events);

        Ok(vote)
    }

    pub fn create_poll(&self, thread_id: Uuid, question: &str, options: &[String]) -> Result<Poll> {
        let poll = Poll {
            id: Uuid::new_v4(),
            thread_id,
            question: question.to_string(),
            options: options.to_vec(),
            created_at: now(),
        };

        let vault_id = self.with_conn(|conn| {
            let vault_id = query_thread(conn, thread_id)?
                .map(|t| t.vault_id)
                .ok_or_else(|| anyhow!("Thread not found: {}", thread_id))?;

            conn.execute(
                "INSERT INTO polls (id, thread_id, question, options, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    poll.id.to_string(),
                    thread_id.to_string(),
                    &poll.question,
                    serde_json::to_string(&poll.options)?,
                    ts_to_sql(&poll.created_at),
                ),
            )?;
            Ok(vault_id)
        })?;

        self.publish(vec![ChangeEvent {
            kind: ChangeKind::Insert,
            vault_id: Some(vault_id),
            thread_id: Some(thread_id),
            record: ChangeRecord::Polls(poll.clone()),
        }]);

        Ok(poll)
    }

    /// Full current row set of a thread.
    pub fn load_thread_rows(&self, thread_id: Uuid) -> Result<ThreadRows> {
        self.with_conn(|conn| {
            let tid = thread_id.to_string();

            let sql = format!(
                "SELECT {} FROM thread_messages WHERE thread_id = ?1 ORDER BY created_at, rowid",
                MESSAGE_COLUMNS
            );
            let messages = conn
                .prepare(&sql)?
                .query_map([&tid], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let reactions = conn
                .prepare(
                    "SELECT r.message_id, r.anon_hash, r.created_at
                     FROM message_reactions r
                     JOIN thread_messages m ON r.message_id = m.id
                     WHERE m.thread_id = ?1",
                )?
                .query_map([&tid], reaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let sql = format!(
                "SELECT {} FROM polls WHERE thread_id = ?1 ORDER BY created_at, rowid",
                POLL_COLUMNS
            );
            let polls = conn
                .prepare(&sql)?
                .query_map([&tid], poll_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let votes = conn
                .prepare(
                    "SELECT v.poll_id, v.anon_hash, v.option_index, v.created_at
                     FROM poll_votes v
                     JOIN polls p ON v.poll_id = p.id
                     WHERE p.thread_id = ?1",
                )?
                .query_map([&tid], vote_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(ThreadRows {
                messages,
                reactions,
                polls,
                votes,
            })
        })
    }
}

fn insert_message(conn: &Connection, m: &ThreadMessage) -> Result<()> {
    conn.execute(
        "INSERT INTO thread_messages (id, thread_id, confession_id, content, anon_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            m.id.to_string(),
            m.thread_id.to_string(),
            m.confession_id.map(|id| id.to_string()),
            m.content,
            m.anon_hash,
            ts_to_sql(&m.created_at),
        ],
    )?;
    Ok(())
}

fn query_thread(conn: &Connection, id: Uuid) -> Result<Option<EchoThread>> {
    let sql = format!("SELECT {} FROM echo_threads WHERE id = ?1", THREAD_COLUMNS);
    let thread = conn
        .query_row(&sql, [id.to_string()], thread_from_row)
        .optional()?;
    Ok(thread)
}

/// (thread_id, vault_id) owning a message.
fn message_scope(conn: &Connection, message_id: Uuid) -> Result<Option<(Uuid, Uuid)>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT t.id, t.vault_id FROM thread_messages m
             JOIN echo_threads t ON m.thread_id = t.id
             WHERE m.id = ?1",
            [message_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    row.map(|(t, v)| -> Result<(Uuid, Uuid)> { Ok((t.parse()?, v.parse()?)) })
        .transpose()
}

/// (option count, thread_id, vault_id) of a poll.
fn poll_scope(conn: &Connection, poll_id: Uuid) -> Result<Option<(usize, Uuid, Uuid)>> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT p.options, t.id, t.vault_id FROM polls p
             JOIN echo_threads t ON p.thread_id = t.id
             WHERE p.id = ?1",
            [poll_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    row.map(|(options, t, v)| -> Result<(usize, Uuid, Uuid)> {
        let options: Vec<String> = serde_json::from_str(&options)?;
        Ok((options.len(), t.parse()?, v.parse()?))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{confession, love_vault};
    use echo_types::models::Visibility;
    use echo_types::view::derive_thread_view;

    fn new_thread() -> NewThread {
        NewThread {
            vault_id: love_vault(),
            title: "I miss my ex".into(),
            visibility: Visibility::Public,
            is_explicit: false,
            owner_id: None,
        }
    }

    fn seeded_thread(db: &Database) -> (EchoThread, Vec<ThreadMessage>) {
        let seed = confession(love_vault(), "I miss my ex", 0);
        db.insert_confession(&seed).unwrap();
        db.create_thread(&new_thread(), &seed, &[]).unwrap()
    }

    #[test]
    fn create_thread_with_seed_and_companions() {
        let db = Database::open_in_memory().unwrap();
        let companion = confession(love_vault(), "I miss them too", 30);
        let seed = confession(love_vault(), "I miss my ex", 0);
        db.insert_confession(&companion).unwrap();
        db.insert_confession(&seed).unwrap();

        let (thread, messages) = db.create_thread(&new_thread(), &seed, &[companion.clone()]).unwrap();
        assert_eq!(thread.created_at, thread.last_activity_at);
        assert_eq!(messages.len(), 2);

        let rows = db.load_thread_rows(thread.id).unwrap();
        assert_eq!(rows.messages.len(), 2);
        assert_eq!(rows.messages[0].confession_id, Some(seed.id));
        assert_eq!(rows.messages[0].anon_hash, seed.anon_hash);
        assert_eq!(rows.messages[1].content, companion.content);
        assert_eq!(db.get_thread(thread.id).unwrap(), Some(thread));
    }

    #[test]
    fn create_thread_publishes_thread_then_messages() {
        let db = Database::open_in_memory().unwrap();
        let mut rx = db.subscribe();
        let (thread, _) = seeded_thread(&db);

        assert_eq!(rx.try_recv().unwrap().record.table(), "confessions");
        let created = rx.try_recv().unwrap();
        assert_eq!(created.record.table(), "echo_threads");
        assert!(created.affects_thread(thread.id));
        assert!(created.affects_vault(love_vault()));
        assert_eq!(rx.try_recv().unwrap().record.table(), "thread_messages");
    }

    #[test]
    fn append_bumps_last_activity() {
        let db = Database::open_in_memory().unwrap();
        let (thread, _) = seeded_thread(&db);

        let outcome = db.append_message(thread.id, "same here", "someone").unwrap();
        assert!(outcome.activity_bumped);

        let reloaded = db.get_thread(thread.id).unwrap().unwrap();
        assert_eq!(reloaded.last_activity_at, outcome.message.created_at);
        assert_eq!(db.load_thread_rows(thread.id).unwrap().messages.len(), 2);
    }

    #[test]
    fn failed_bump_keeps_message_and_skips_thread_update() {
        let db = Database::open_in_memory().unwrap();
        let (thread, _) = seeded_thread(&db);
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER freeze_threads BEFORE UPDATE ON echo_threads
                 BEGIN SELECT RAISE(ABORT, 'frozen'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let mut rx = db.subscribe();
        let outcome = db.append_message(thread.id, "still here", "someone").unwrap();
        assert!(!outcome.activity_bumped);

        let rows = db.load_thread_rows(thread.id).unwrap();
        assert_eq!(rows.messages.len(), 2);
        assert_eq!(rows.messages[1].id, outcome.message.id);
        assert_eq!(
            db.get_thread(thread.id).unwrap().unwrap().last_activity_at,
            thread.last_activity_at
        );

        let tables: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.record.table())
            .collect();
        assert_eq!(tables, vec!["thread_messages"]);
    }

    #[test]
    fn append_to_missing_thread_fails() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.append_message(Uuid::new_v4(), "hello", "x").is_err());
    }

    #[test]
    fn react_twice_counts_once() {
        let db = Database::open_in_memory().unwrap();
        let (thread, messages) = seeded_thread(&db);
        let mid = messages[0].id;

        assert_eq!(db.react(mid, "alice").unwrap(), Some(true));
        assert_eq!(db.react(mid, "alice").unwrap(), Some(false));
        assert_eq!(db.react(mid, "bob").unwrap(), Some(true));
        assert_eq!(db.react(Uuid::new_v4(), "alice").unwrap(), None);

        let rows = db.load_thread_rows(thread.id).unwrap();
        assert_eq!(rows.reactions.len(), 2);
        let view = derive_thread_view(&rows, Some("alice"));
        assert_eq!(view.messages[0].reactions.count, 2);
        assert!(view.messages[0].reactions.has_reacted);
    }

    #[test]
    fn revote_replaces_prior_vote() {
        let db = Database::open_in_memory().unwrap();
        let (thread, _) = seeded_thread(&db);
        let options = vec!["stay".to_string(), "go".to_string(), "text them".to_string()];
        let poll = db.create_poll(thread.id, "What now?", &options).unwrap();
        assert_eq!(db.get_poll(poll.id).unwrap(), Some(poll.clone()));

        let mut rx = db.subscribe();
        db.vote(poll.id, "x", 1).unwrap();
        db.vote(poll.id, "x", 2).unwrap();
        db.vote(poll.id, "y", 2).unwrap();

        let kinds: Vec<ChangeKind> = std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Insert, ChangeKind::Delete, ChangeKind::Insert, ChangeKind::Insert]
        );

        let rows = db.load_thread_rows(thread.id).unwrap();
        assert_eq!(rows.votes.len(), 2);
        let view = derive_thread_view(&rows, Some("x"));
        assert_eq!(view.polls[0].votes, vec![0, 0, 2]);
        assert_eq!(view.polls[0].my_vote, Some(2));
    }

    #[test]
    fn vote_out_of_range_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let (thread, _) = seeded_thread(&db);
        let poll = db
            .create_poll(thread.id, "?", &["a".to_string(), "b".to_string()])
            .unwrap();
        assert!(db.vote(poll.id, "x", 2).is_err());
        assert!(db.vote(Uuid::new_v4(), "x", 0).is_err());
        assert!(db.load_thread_rows(thread.id).unwrap().votes.is_empty());
    }
}
