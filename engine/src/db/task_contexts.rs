/// Task context persistence operations
///
/// Long-running multi-turn flows (the planner's preference gathering, for
/// one) park partial progress here between turns, keyed by session and task
/// name. Rows are upserted on every turn of the task and deleted once the
/// task completes. Deleting a session cascades to its task contexts.
use sdk::errors::CoreError;
use sqlx::{Row, SqlitePool};

use super::now_millis;

/// Cross-turn scratch state for one task within one session
#[derive(Debug, Clone, PartialEq)]
pub struct TaskContext {
    /// Task progress status, handler-defined (e.g. "collecting")
    pub status: String,

    /// Opaque partial-progress payload
    pub payload: serde_json::Value,
}

/// Repository for task context rows
#[derive(Clone)]
pub struct TaskContextRepository {
    pool: SqlitePool,
}

fn db_err(action: &str, e: sqlx::Error) -> CoreError {
    CoreError::Persistence(format!("{action}: {e}"))
}

impl TaskContextRepository {
    /// Create a new task context repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update the context for (session, task).
    pub async fn save(
        &self,
        session_id: i64,
        task_name: &str,
        status: &str,
        payload: &serde_json::Value,
    ) -> Result<(), CoreError> {
        let now = now_millis();

        sqlx::query(
            "INSERT INTO task_contexts (session_id, task_name, status, payload, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (session_id, task_name) DO UPDATE SET \
             status = excluded.status, payload = excluded.payload, updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(task_name)
        .bind(status)
        .bind(payload.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("save task context", e))?;

        Ok(())
    }

    /// Load the context for (session, task), if any.
    pub async fn load(
        &self,
        session_id: i64,
        task_name: &str,
    ) -> Result<Option<TaskContext>, CoreError> {
        let row = sqlx::query(
            "SELECT status, payload FROM task_contexts WHERE session_id = ? AND task_name = ?",
        )
        .bind(session_id)
        .bind(task_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("load task context", e))?;

        Ok(row.map(|r| {
            let payload = r
                .get::<Option<String>, _>("payload")
                .and_then(|raw| serde_json::from_str(&raw).ok())
                .unwrap_or_else(|| serde_json::json!({}));

            TaskContext {
                status: r.get("status"),
                payload,
            }
        }))
    }

    /// Remove the context once the task is complete. Returns whether a row
    /// existed.
    pub async fn clear(&self, session_id: i64, task_name: &str) -> Result<bool, CoreError> {
        let result =
            sqlx::query("DELETE FROM task_contexts WHERE session_id = ? AND task_name = ?")
                .bind(session_id)
                .bind(task_name)
                .execute(&self.pool)
                .await
                .map_err(|e| db_err("clear task context", e))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    async fn session_fixture() -> (Database, i64) {
        let db = Database::new_in_memory().await.unwrap();
        let sessions = db.sessions();
        sessions.upsert_user("u1", None).await.unwrap();
        let sid = sessions
            .create_session("u1", "Plan", "PLANNER", None)
            .await
            .unwrap();
        (db, sid)
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let (db, sid) = session_fixture().await;
        let repo = db.task_contexts();

        repo.save(sid, "collect_preferences", "collecting", &json!({"level": "N4"}))
            .await
            .unwrap();

        let ctx = repo.load(sid, "collect_preferences").await.unwrap().unwrap();
        assert_eq!(ctx.status, "collecting");
        assert_eq!(ctx.payload, json!({"level": "N4"}));
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let (db, sid) = session_fixture().await;
        let repo = db.task_contexts();

        repo.save(sid, "collect_preferences", "collecting", &json!({"level": "N4"}))
            .await
            .unwrap();
        repo.save(
            sid,
            "collect_preferences",
            "ready",
            &json!({"level": "N4", "target": "N2"}),
        )
        .await
        .unwrap();

        let ctx = repo.load(sid, "collect_preferences").await.unwrap().unwrap();
        assert_eq!(ctx.status, "ready");
        assert_eq!(ctx.payload, json!({"level": "N4", "target": "N2"}));

        // Still exactly one row for the pair
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM task_contexts WHERE session_id = ? AND task_name = ?",
        )
        .bind(sid)
        .bind("collect_preferences")
        .fetch_one(&repo.pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let (db, sid) = session_fixture().await;
        let repo = db.task_contexts();

        repo.save(sid, "quiz", "started", &json!({})).await.unwrap();
        assert!(repo.clear(sid, "quiz").await.unwrap());
        assert!(!repo.clear(sid, "quiz").await.unwrap());
        assert!(repo.load(sid, "quiz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_delete_cascades() {
        let (db, sid) = session_fixture().await;
        let repo = db.task_contexts();

        repo.save(sid, "quiz", "started", &json!({"q": 1})).await.unwrap();
        db.sessions().delete_session(sid).await.unwrap();

        assert!(repo.load(sid, "quiz").await.unwrap().is_none());
    }
}
