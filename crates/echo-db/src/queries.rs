use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use uuid::Uuid;

use echo_types::events::{ChangeEvent, ChangeKind, ChangeRecord};
use echo_types::models::{Confession, EchoThread, ThreadMessage, Vault};
use echo_types::view::{FeedEntry, FeedOrder, derive_feed};

use crate::Database;
use crate::models::{
    CONFESSION_COLUMNS, MESSAGE_COLUMNS, THREAD_COLUMNS, ThreadQuery, VAULT_COLUMNS,
    confession_from_row, message_from_row, thread_from_row, ts_to_sql, vault_from_row,
};

impl Database {
    // -- Vaults --

    pub fn list_vaults(&self) -> Result<Vec<Vault>> {
        self.with_conn(query_vaults)
    }

    pub fn get_vault(&self, id: Uuid) -> Result<Option<Vault>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM vaults WHERE id = ?1", VAULT_COLUMNS);
            let vault = conn
                .query_row(&sql, [id.to_string()], vault_from_row)
                .optional()?;
            Ok(vault)
        })
    }

    // -- Confessions --

    pub fn insert_confession(&self, confession: &Confession) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO confessions
                    (id, vault_id, title, content, mood, is_public, owner_id, anon_hash, is_explicit, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    confession.id.to_string(),
                    confession.vault_id.to_string(),
                    confession.title,
                    confession.content,
                    confession.mood,
                    confession.visibility.is_public(),
                    confession.owner_id,
                    confession.anon_hash,
                    confession.is_explicit,
                    ts_to_sql(&confession.created_at),
                ],
            )?;
            Ok(())
        })?;

        self.publish(vec![ChangeEvent {
            kind: ChangeKind::Insert,
            vault_id: Some(confession.vault_id),
            thread_id: None,
            record: ChangeRecord::Confessions(confession.clone()),
        }]);
        Ok(())
    }

    /// Most recent confessions in a vault, newest first, excluding `exclude`.
    pub fn recent_confessions(
        &self,
        vault_id: Uuid,
        exclude: Uuid,
        limit: u32,
    ) -> Result<Vec<Confession>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM confessions
                 WHERE vault_id = ?1 AND id != ?2
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
                CONFESSION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![vault_id.to_string(), exclude.to_string(), limit],
                    confession_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Feeds --

    pub fn list_threads(&self, query: &ThreadQuery) -> Result<Vec<EchoThread>> {
        self.with_conn(|conn| query_threads(conn, query))
    }

    /// Threads for a feed, with their messages and vaults folded into entries.
    pub fn load_feed(&self, query: &ThreadQuery) -> Result<Vec<FeedEntry>> {
        self.with_conn(|conn| {
            let threads = query_threads(conn, query)?;
            let ids: Vec<String> = threads.iter().map(|t| t.id.to_string()).collect();
            let messages = query_messages_for_threads(conn, &ids)?;
            let vaults = query_vaults(conn)?;
            Ok(derive_feed(&threads, &messages, &vaults, query.filter, query.order))
        })
    }
}

fn query_vaults(conn: &Connection) -> Result<Vec<Vault>> {
    let sql = format!("SELECT {} FROM vaults ORDER BY name", VAULT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], vault_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_threads(conn: &Connection, query: &ThreadQuery) -> Result<Vec<EchoThread>> {
    let mut sql = format!("SELECT {} FROM echo_threads WHERE 1 = 1", THREAD_COLUMNS);
    let mut params: Vec<Value> = Vec::new();

    if let Some(vault_id) = query.vault_id {
        params.push(Value::Text(vault_id.to_string()));
        sql.push_str(&format!(" AND vault_id = ?{}", params.len()));
    }
    if !query.filter.include_private {
        sql.push_str(" AND is_public = 1");
    }
    if let Some(explicit) = query.filter.explicit {
        params.push(Value::Integer(i64::from(explicit)));
        sql.push_str(&format!(" AND is_explicit = ?{}", params.len()));
    }

    // Full ordering in SQL so ties cannot shuffle across pages.
    sql.push_str(match query.order {
        FeedOrder::Activity => {
            " ORDER BY last_activity_at DESC,
               (SELECT MAX(m.created_at) FROM thread_messages m
                WHERE m.thread_id = echo_threads.id) DESC,
               rowid DESC"
        }
        FeedOrder::Created => " ORDER BY created_at DESC, rowid DESC",
    });

    params.push(Value::Integer(i64::from(query.limit)));
    sql.push_str(&format!(" LIMIT ?{}", params.len()));
    params.push(Value::Integer(i64::from(query.offset)));
    sql.push_str(&format!(" OFFSET ?{}", params.len()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), thread_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Batch-fetch messages for a set of thread IDs.
pub(crate) fn query_messages_for_threads(
    conn: &Connection,
    thread_ids: &[String],
) -> Result<Vec<ThreadMessage>> {
    if thread_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=thread_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT {} FROM thread_messages WHERE thread_id IN ({}) ORDER BY created_at, rowid",
        MESSAGE_COLUMNS,
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(thread_ids.iter()), message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{confession, love_vault};
    use echo_types::view::FeedFilter;

    #[test]
    fn seeded_vaults_are_listed() {
        let db = Database::open_in_memory().unwrap();
        let vaults = db.list_vaults().unwrap();
        let names: Vec<&str> = vaults.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Dreams", "Love", "Secrets", "Stress"]);
        assert!(db.get_vault(love_vault()).unwrap().is_some());
        assert!(db.get_vault(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn recent_confessions_newest_first_excluding_self() {
        let db = Database::open_in_memory().unwrap();
        let old = confession(love_vault(), "old one", 60);
        let new = confession(love_vault(), "new one", 1);
        let me = confession(love_vault(), "me", 0);
        for c in [&old, &new, &me] {
            db.insert_confession(c).unwrap();
        }

        let recent = db.recent_confessions(love_vault(), me.id, 50).unwrap();
        let ids: Vec<Uuid> = recent.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![new.id, old.id]);

        let capped = db.recent_confessions(love_vault(), me.id, 1).unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn insert_confession_is_published() {
        let db = Database::open_in_memory().unwrap();
        let mut rx = db.subscribe();
        let c = confession(love_vault(), "hello", 0);
        db.insert_confession(&c).unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.record.table(), "confessions");
        assert_eq!(event.vault_id, Some(love_vault()));
    }

    fn feed_query(order: FeedOrder, offset: u32, limit: u32) -> ThreadQuery {
        ThreadQuery {
            vault_id: None,
            filter: FeedFilter::default(),
            order,
            offset,
            limit,
        }
    }

    /// Three threads sharing one timestamp; only the middle one has a message.
    fn tied_threads(db: &Database) -> Vec<Uuid> {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let at = "2026-01-01T00:00:00.000000Z";
        db.with_conn(|conn| {
            for id in &ids {
                conn.execute(
                    "INSERT INTO echo_threads
                        (id, vault_id, title, is_public, is_explicit, owner_id, created_at, last_activity_at)
                     VALUES (?1, ?2, 'tied', 1, 0, NULL, ?3, ?3)",
                    (id.to_string(), love_vault().to_string(), at),
                )?;
            }
            conn.execute(
                "INSERT INTO thread_messages (id, thread_id, confession_id, content, anon_hash, created_at)
                 VALUES (?1, ?2, NULL, 'hi', 'x', ?3)",
                (Uuid::new_v4().to_string(), ids[1].to_string(), at),
            )?;
            Ok(())
        })
        .unwrap();
        ids
    }

    fn paged_ids(db: &Database, order: FeedOrder) -> Vec<Uuid> {
        (0..3)
            .flat_map(|offset| db.load_feed(&feed_query(order, offset, 1)).unwrap())
            .map(|e| e.thread.id)
            .collect()
    }

    #[test]
    fn tied_activity_pages_follow_latest_message_then_insertion() {
        let db = Database::open_in_memory().unwrap();
        let ids = tied_threads(&db);

        let paged = paged_ids(&db, FeedOrder::Activity);
        assert_eq!(paged, vec![ids[1], ids[2], ids[0]]);

        let whole: Vec<Uuid> = db
            .load_feed(&feed_query(FeedOrder::Activity, 0, 3))
            .unwrap()
            .into_iter()
            .map(|e| e.thread.id)
            .collect();
        assert_eq!(whole, paged);
    }

    #[test]
    fn tied_created_pages_are_stable() {
        let db = Database::open_in_memory().unwrap();
        let ids = tied_threads(&db);
        assert_eq!(paged_ids(&db, FeedOrder::Created), vec![ids[2], ids[1], ids[0]]);
    }

    #[test]
    fn empty_feed() {
        let db = Database::open_in_memory().unwrap();
        let query = ThreadQuery {
            vault_id: None,
            filter: FeedFilter::default(),
            order: FeedOrder::Activity,
            offset: 0,
            limit: 30,
        };
        assert!(db.load_feed(&query).unwrap().is_empty());
    }
}
