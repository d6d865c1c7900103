use std::collections::HashMap;

use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use dockline_types::models::{Message, MessageKind, Thread, ThreadKind};

use crate::models::{MessageRow, ThreadRow, parse_uuid};
use crate::{Database, Result, StoreError};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: Uuid, display_name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, display_name) VALUES (?1, ?2)",
                (id.to_string(), display_name),
            )?;
            Ok(())
        })
    }

    pub fn display_name(&self, user_id: Uuid) -> Result<String> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT display_name FROM users WHERE id = ?1",
                [user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
        })
    }

    // -- Threads --

    pub fn insert_thread(&self, thread: &Thread) -> Result<()> {
        let kind = match thread.kind {
            ThreadKind::Direct => "direct",
            ThreadKind::Broadcast => "broadcast",
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO threads (id, kind, title, urgent, creator_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    thread.id.to_string(),
                    kind,
                    thread.title,
                    thread.urgent,
                    thread.creator_id.to_string(),
                    thread.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Membership edges are inserted one row at a time with OR IGNORE,
    /// so a retried call after a partial failure converges instead of
    /// erroring on the rows that already exist.
    pub fn insert_participants(&self, thread_id: Uuid, user_ids: &[Uuid]) -> Result<()> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "INSERT OR IGNORE INTO participants (thread_id, user_id) VALUES (?1, ?2)",
            )?;
            for user_id in user_ids {
                stmt.execute((thread_id.to_string(), user_id.to_string()))?;
            }
            Ok(())
        })
    }

    /// Threads the user belongs to, each annotated with its full
    /// participant id list. A thread whose participant set never got
    /// written (a create that failed between steps) has no membership
    /// edge and is therefore invisible here by construction.
    pub fn list_threads_for_user(&self, user_id: Uuid) -> Result<Vec<Thread>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.kind, t.title, t.urgent, t.creator_id, t.created_at
                 FROM threads t
                 JOIN participants p ON p.thread_id = t.id
                 WHERE p.user_id = ?1
                 ORDER BY t.created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(ThreadRow {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        title: row.get(2)?,
                        urgent: row.get(3)?,
                        creator_id: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let mut members = query_participants(conn, &ids)?;

            rows.into_iter()
                .map(|row| {
                    let participant_ids = members.remove(&row.id).unwrap_or_default();
                    row.into_thread(participant_ids)
                })
                .collect()
        })
    }

    pub fn get_thread(&self, thread_id: Uuid) -> Result<Option<Thread>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, kind, title, urgent, creator_id, created_at
                     FROM threads WHERE id = ?1",
                    [thread_id.to_string()],
                    |row| {
                        Ok(ThreadRow {
                            id: row.get(0)?,
                            kind: row.get(1)?,
                            title: row.get(2)?,
                            urgent: row.get(3)?,
                            creator_id: row.get(4)?,
                            created_at: row.get(5)?,
                        })
                    },
                )
                .optional()?;

            let Some(row) = row else {
                return Ok(None);
            };
            let members = query_participants(conn, &[row.id.clone()])?
                .remove(&row.id)
                .unwrap_or_default();
            row.into_thread(members).map(Some)
        })
    }

    // -- Messages --

    /// Rejects senders outside the thread's participant set, standing
    /// in for the backend's row-level access control.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let kind = match message.kind {
            MessageKind::Text => "text",
        };
        self.with_conn(|conn| {
            let member = conn
                .query_row(
                    "SELECT 1 FROM participants WHERE thread_id = ?1 AND user_id = ?2",
                    (message.thread_id.to_string(), message.sender_id.to_string()),
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !member {
                return Err(StoreError::AccessDenied(format!(
                    "user {} is not a participant of thread {}",
                    message.sender_id, message.thread_id
                )));
            }
            conn.execute(
                "INSERT INTO messages (id, thread_id, sender_id, body, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.id.to_string(),
                    message.thread_id.to_string(),
                    message.sender_id.to_string(),
                    message.body,
                    kind,
                    message.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Messages for a thread, oldest first. rowid breaks timestamp
    /// ties in insertion order.
    pub fn list_messages(&self, thread_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, thread_id, sender_id, body, kind, created_at
                 FROM messages
                 WHERE thread_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([thread_id.to_string()], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        thread_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        body: row.get(3)?,
                        kind: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }

    // -- Read state --

    /// Create read marks for every currently-unread message of the
    /// thread, for this user, as of call time. Never marks the user's
    /// own messages. Idempotent: a second call with no new messages
    /// inserts nothing and does not error.
    ///
    /// Rejects non-participants, standing in for the backend's
    /// row-level access control.
    pub fn mark_thread_read(&self, thread_id: Uuid, user_id: Uuid) -> Result<usize> {
        if !self.is_participant(thread_id, user_id)? {
            return Err(StoreError::AccessDenied(format!(
                "user {} is not a participant of thread {}",
                user_id, thread_id
            )));
        }
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO read_marks (message_id, user_id)
                 SELECT m.id, ?2 FROM messages m
                 WHERE m.thread_id = ?1 AND m.sender_id != ?2",
                (thread_id.to_string(), user_id.to_string()),
            )?;
            if inserted > 0 {
                debug!("Marked {} messages read in thread {}", inserted, thread_id);
            }
            Ok(inserted)
        })
    }

    /// The server-side aggregate behind the global badge: the number
    /// of *threads* (not messages) holding at least one message the
    /// user has not read and did not send.
    pub fn count_unread_for_user(&self, user_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: u64 = conn.query_row(
                "SELECT COUNT(DISTINCT m.thread_id)
                 FROM messages m
                 JOIN participants p ON p.thread_id = m.thread_id AND p.user_id = ?1
                 WHERE m.sender_id != ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM read_marks r
                       WHERE r.message_id = m.id AND r.user_id = ?1
                   )",
                [user_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Reconciliation query: the threads currently unread for a user,
    /// used to seed per-thread flags so events delivered before the
    /// view mounted are not missed.
    pub fn unread_thread_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT m.thread_id
                 FROM messages m
                 JOIN participants p ON p.thread_id = m.thread_id AND p.user_id = ?1
                 WHERE m.sender_id != ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM read_marks r
                       WHERE r.message_id = m.id AND r.user_id = ?1
                   )",
            )?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            ids.iter()
                .map(|raw| parse_uuid(raw, "thread_id"))
                .collect()
        })
    }

    /// Membership probe. Expected to return false often — the global
    /// listener checks threads it may not belong to.
    pub fn is_participant(&self, thread_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM participants WHERE thread_id = ?1 AND user_id = ?2",
                    (thread_id.to_string(), user_id.to_string()),
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Deletion --

    /// Remove a thread and everything hanging off it, in dependency
    /// order: read marks, messages, participants, the thread row. Each
    /// step is a separate statement; if one fails the remainder is not
    /// attempted and nothing already deleted is restored.
    pub fn delete_thread_cascade(&self, thread_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            let tid = thread_id.to_string();
            conn.execute(
                "DELETE FROM read_marks WHERE message_id IN
                     (SELECT id FROM messages WHERE thread_id = ?1)",
                [&tid],
            )?;
            conn.execute("DELETE FROM messages WHERE thread_id = ?1", [&tid])?;
            conn.execute("DELETE FROM participants WHERE thread_id = ?1", [&tid])?;
            conn.execute("DELETE FROM threads WHERE id = ?1", [&tid])?;
            debug!("Deleted thread {} and its dependents", thread_id);
            Ok(())
        })
    }
}

/// Batch-fetch participant ids for a set of threads, keyed by thread id.
fn query_participants(
    conn: &Connection,
    thread_ids: &[String],
) -> Result<HashMap<String, Vec<Uuid>>> {
    if thread_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (1..=thread_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT thread_id, user_id FROM participants WHERE thread_id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = thread_ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();

    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut map: HashMap<String, Vec<Uuid>> = HashMap::new();
    for (thread_id, user_id) in rows {
        map.entry(thread_id)
            .or_default()
            .push(parse_uuid(&user_id, "participant user_id")?);
    }
    Ok(map)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn setup() -> (Database, Uuid, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        db.create_user(a, "Ana").unwrap();
        db.create_user(b, "Bo").unwrap();
        (db, a, b)
    }

    fn make_thread(db: &Database, creator: Uuid, members: &[Uuid]) -> Thread {
        let thread = Thread {
            id: Uuid::new_v4(),
            kind: if members.len() == 2 {
                ThreadKind::Direct
            } else {
                ThreadKind::Broadcast
            },
            title: None,
            urgent: false,
            creator_id: creator,
            created_at: Utc::now(),
            participant_ids: members.to_vec(),
        };
        db.insert_thread(&thread).unwrap();
        db.insert_participants(thread.id, members).unwrap();
        thread
    }

    #[test]
    fn messages_come_back_oldest_first_with_stable_ties() {
        let (db, a, b) = setup();
        let thread = make_thread(&db, a, &[a, b]);

        let stamp = Utc::now();
        let bodies = ["first", "second", "third"];
        for body in bodies {
            let mut m = Message::new(thread.id, a, body);
            m.created_at = stamp;
            db.insert_message(&m).unwrap();
        }

        let listed = db.list_messages(thread.id).unwrap();
        let got: Vec<&str> = listed.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(got, bodies);
    }

    #[test]
    fn unread_count_ignores_own_messages() {
        let (db, a, b) = setup();
        let thread = make_thread(&db, a, &[a, b]);

        db.insert_message(&Message::new(thread.id, a, "mine")).unwrap();
        assert_eq!(db.count_unread_for_user(a).unwrap(), 0);
        assert_eq!(db.count_unread_for_user(b).unwrap(), 1);
        assert_eq!(db.unread_thread_ids_for_user(b).unwrap(), vec![thread.id]);
    }

    #[test]
    fn insert_participants_is_retriable() {
        let (db, a, b) = setup();
        let thread = make_thread(&db, a, &[a, b]);

        // Retry after a hypothetical partial failure converges.
        db.insert_participants(thread.id, &[a, b]).unwrap();

        let listed = db.list_threads_for_user(a).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].participant_ids.len(), 2);
    }

    #[test]
    fn cascade_leaves_no_rows_behind() {
        let (db, a, b) = setup();
        let thread = make_thread(&db, a, &[a, b]);
        db.insert_message(&Message::new(thread.id, a, "one")).unwrap();
        db.insert_message(&Message::new(thread.id, b, "two")).unwrap();
        db.mark_thread_read(thread.id, a).unwrap();
        db.mark_thread_read(thread.id, b).unwrap();

        db.delete_thread_cascade(thread.id).unwrap();

        let remaining: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM read_marks)
                          + (SELECT COUNT(*) FROM messages)
                          + (SELECT COUNT(*) FROM participants)
                          + (SELECT COUNT(*) FROM threads)",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
