/// Session and message persistence operations
///
/// This module owns the relational contract of the session core: users,
/// sessions, and their strictly ordered message turns. All queries are
/// parameterized; table and column names are fixed in code.
///
/// Every write runs as one transaction. Turn order numbers are assigned
/// inside the same transaction as their insert, and a per-session async
/// mutex is held across append and rewind so concurrent writers against the
/// same session cannot collide on the order sequence.
use sdk::errors::CoreError;
use sdk::types::{SessionData, SessionSummary, Turn};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::now_millis;
use crate::history;

/// Per-session write locks, shared by every repository handed out by one
/// `Database`.
///
/// The map grows one entry per session that has seen a write; entries are
/// dropped when the session is deleted.
#[derive(Clone, Default)]
pub struct SessionLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SessionLocks {
    fn for_session(&self, session_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut table = self.inner.lock().expect("session lock table poisoned");
        Arc::clone(table.entry(session_id).or_default())
    }

    fn forget(&self, session_id: i64) {
        let mut table = self.inner.lock().expect("session lock table poisoned");
        table.remove(&session_id);
    }
}

/// Session repository for database operations
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
    locks: SessionLocks,
}

fn db_err(action: &str, e: sqlx::Error) -> CoreError {
    CoreError::Persistence(format!("{action}: {e}"))
}

impl SessionRepository {
    /// Create a new session repository
    pub fn new(pool: SqlitePool, locks: SessionLocks) -> Self {
        Self { pool, locks }
    }

    /// Create the user row if absent; succeed silently if present.
    ///
    /// Returns whether a new row was inserted. The display name defaults to
    /// the user id on first contact.
    pub async fn upsert_user(
        &self,
        user_id: &str,
        display_name: Option<&str>,
    ) -> Result<bool, CoreError> {
        let now = now_millis();

        let result = sqlx::query(
            "INSERT INTO users (user_id, display_name, created_at) VALUES (?, ?, ?) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(display_name.unwrap_or(user_id))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("upsert user", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Insert a new session row and return its identifier.
    ///
    /// Fails with `Persistence` if the insert cannot be committed, including
    /// when the owning user row is missing (foreign key violation).
    pub async fn create_session(
        &self,
        user_id: &str,
        name: &str,
        session_type: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<i64, CoreError> {
        let now = now_millis();
        let context_json = context.map(serde_json::Value::to_string);

        let result = sqlx::query(
            "INSERT INTO sessions (user_id, name, session_type, context, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(name)
        .bind(session_type)
        .bind(context_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("create session", e))?;

        Ok(result.last_insert_rowid())
    }

    /// List a user's sessions, most recently updated first.
    ///
    /// An unknown user simply has no sessions; this is not an error.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, CoreError> {
        let rows = sqlx::query(
            "SELECT id, name, updated_at FROM sessions WHERE user_id = ? \
             ORDER BY updated_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list sessions", e))?;

        Ok(rows
            .into_iter()
            .map(|r| SessionSummary {
                id: r.get("id"),
                name: r.get("name"),
                updated_at: r.get("updated_at"),
            })
            .collect())
    }

    /// Load a session together with its full ordered history.
    ///
    /// Returns `None` when the session does not exist.
    pub async fn load_session(&self, session_id: i64) -> Result<Option<SessionData>, CoreError> {
        let row = sqlx::query("SELECT user_id, session_type, context FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("load session", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let context = row
            .get::<Option<String>, _>("context")
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "Stored session context is not valid JSON");
                    None
                }
            });

        let message_rows = sqlx::query(
            "SELECT role, content FROM messages WHERE session_id = ? ORDER BY message_order ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("load session history", e))?;

        let stored: Vec<(String, String)> = message_rows
            .into_iter()
            .map(|r| (r.get("role"), r.get("content")))
            .collect();

        Ok(Some(SessionData {
            user_id: row.get("user_id"),
            session_type: row.get("session_type"),
            context,
            history: history::to_history(stored),
        }))
    }

    /// Append turns to a session as one atomic unit.
    ///
    /// Each turn gets the next sequential order number starting from
    /// `max(existing order) + 1`, and the session's `updated_at` is bumped in
    /// the same transaction. The per-session lock is held for the whole
    /// operation, so two concurrent appends can never read the same max.
    pub async fn append_turns(&self, session_id: i64, turns: &[Turn]) -> Result<(), CoreError> {
        if turns.is_empty() {
            return Ok(());
        }

        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err("begin append", e))?;

        let exists = sqlx::query("SELECT id FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err("check session", e))?;

        if exists.is_none() {
            return Err(CoreError::NotFound(format!("session {session_id}")));
        }

        let last_order: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(message_order), 0) FROM messages WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_err("read max order", e))?;

        let now = now_millis();

        for (i, turn) in turns.iter().enumerate() {
            sqlx::query(
                "INSERT INTO messages (session_id, role, content, message_order, created_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(turn.role())
            .bind(turn.content())
            .bind(last_order + i as i64 + 1)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("insert message", e))?;
        }

        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("bump session updated_at", e))?;

        tx.commit().await.map_err(|e| db_err("commit append", e))?;

        Ok(())
    }

    /// Atomically remove the last human/assistant pair from a session.
    ///
    /// `updated_at` is reset to the timestamp of the new last remaining
    /// message, or to the session's creation time if none remain. Returns
    /// `false` without mutating anything when fewer than two messages exist;
    /// that is a documented refusal, not an error.
    pub async fn rewind_last_turn(&self, session_id: i64) -> Result<bool, CoreError> {
        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err("begin rewind", e))?;

        let session_created: Option<i64> =
            sqlx::query_scalar("SELECT created_at FROM sessions WHERE id = ?")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_err("check session", e))?;

        let Some(session_created) = session_created else {
            return Err(CoreError::NotFound(format!("session {session_id}")));
        };

        // The two most recent messages are the pair to remove; the third most
        // recent (if any) supplies the restored timestamp.
        let tail = sqlx::query(
            "SELECT id, created_at FROM messages WHERE session_id = ? \
             ORDER BY message_order DESC LIMIT 3",
        )
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| db_err("read session tail", e))?;

        if tail.len() < 2 {
            return Ok(false);
        }

        let restored_at: i64 = tail
            .get(2)
            .map(|r| r.get("created_at"))
            .unwrap_or(session_created);

        for row in tail.iter().take(2) {
            sqlx::query("DELETE FROM messages WHERE id = ?")
                .bind(row.get::<i64, _>("id"))
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err("delete message", e))?;
        }

        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(restored_at)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("restore session updated_at", e))?;

        tx.commit().await.map_err(|e| db_err("commit rewind", e))?;

        Ok(true)
    }

    /// Rename a session. Returns `false` if the session does not exist.
    pub async fn rename_session(&self, session_id: i64, new_name: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("UPDATE sessions SET name = ? WHERE id = ?")
            .bind(new_name)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("rename session", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a session and, via cascade, all its messages and task
    /// contexts. Returns `false` if the session does not exist.
    pub async fn delete_session(&self, session_id: i64) -> Result<bool, CoreError> {
        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;

        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("delete session", e))?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            drop(_guard);
            self.locks.forget(session_id);
        }

        Ok(deleted)
    }

    /// Find the most recently updated session matching user, type, and an
    /// optional subset of context key/value pairs.
    ///
    /// The stored context must contain every filter pair; extra stored keys
    /// are ignored. At most one summary is returned, ties broken by most
    /// recent update. This subset rule is what makes find-or-create
    /// idempotent across repeated identical contexts.
    pub async fn find_session(
        &self,
        user_id: &str,
        session_type: &str,
        context_filter: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Option<SessionSummary>, CoreError> {
        let rows = sqlx::query(
            "SELECT id, name, context, updated_at FROM sessions \
             WHERE user_id = ? AND session_type = ? \
             ORDER BY updated_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(session_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("find session", e))?;

        for row in rows {
            let matches = match context_filter {
                None => true,
                Some(filter) => {
                    let stored: Option<serde_json::Value> = row
                        .get::<Option<String>, _>("context")
                        .and_then(|raw| serde_json::from_str(&raw).ok());
                    context_contains(stored.as_ref(), filter)
                }
            };

            if matches {
                return Ok(Some(SessionSummary {
                    id: row.get("id"),
                    name: row.get("name"),
                    updated_at: row.get("updated_at"),
                }));
            }
        }

        Ok(None)
    }
}

/// Subset match: every filter pair must appear in the stored context.
fn context_contains(
    stored: Option<&serde_json::Value>,
    filter: &serde_json::Map<String, serde_json::Value>,
) -> bool {
    if filter.is_empty() {
        return true;
    }
    match stored {
        Some(serde_json::Value::Object(map)) => {
            filter.iter().all(|(key, value)| map.get(key) == Some(value))
        }
        _ => false,
    }
}


#[cfg(test)]
impl SessionRepository {
    /// Test-only access to the underlying pool for raw assertions.
    fn pool_ref(&self) -> &SqlitePool {
        &self.pool
    }
}
