//! Session lifecycle controller
//!
//! Thin orchestration over the session repository: user bootstrap, session
//! creation, rename/delete, and find-or-create semantics. Read paths degrade
//! to empty results (logged) so a storage hiccup never takes down a listing
//! endpoint; write paths always surface their failure.

use sdk::errors::CoreError;
use sdk::types::{SessionData, SessionSummary};
use tracing::{error, info};

use crate::db::SessionRepository;

/// Session lifecycle service
#[derive(Clone)]
pub struct SessionService {
    repo: SessionRepository,
}

impl SessionService {
    pub fn new(repo: SessionRepository) -> Self {
        Self { repo }
    }

    /// Direct repository access, for callers that need the full contract.
    pub fn repo(&self) -> &SessionRepository {
        &self.repo
    }

    /// Ensure the user row exists. Idempotent.
    pub async fn get_or_create_user(
        &self,
        user_id: &str,
        display_name: Option<&str>,
    ) -> Result<(), CoreError> {
        let created = self.repo.upsert_user(user_id, display_name).await?;
        if created {
            info!(user_id, "Created user on first contact");
        }
        Ok(())
    }

    /// Create a session for a user, bootstrapping the user row first.
    pub async fn create_session(
        &self,
        user_id: &str,
        name: &str,
        session_type: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<i64, CoreError> {
        self.get_or_create_user(user_id, None).await?;

        let session_id = self
            .repo
            .create_session(user_id, name, session_type, context)
            .await?;

        info!(user_id, session_id, session_type, "Created session");
        Ok(session_id)
    }

    /// List a user's sessions, most recent first.
    ///
    /// Degrades to an empty list on storage failure; the failure is logged
    /// so "no sessions" and "storage unreachable" stay distinguishable in
    /// operation even when the response collapses them.
    pub async fn list_sessions(&self, user_id: &str) -> Vec<SessionSummary> {
        match self.repo.list_sessions(user_id).await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(user_id, error = %e, "Failed to list sessions, returning empty");
                Vec::new()
            }
        }
    }

    /// Load a session with its history, or `None` when it does not exist.
    pub async fn load_session(&self, session_id: i64) -> Result<Option<SessionData>, CoreError> {
        self.repo.load_session(session_id).await
    }

    /// Rename a session. Returns `false` when it does not exist.
    pub async fn rename_session(&self, session_id: i64, new_name: &str) -> Result<bool, CoreError> {
        self.repo.rename_session(session_id, new_name).await
    }

    /// Delete a session and everything it owns. Returns `false` when it does
    /// not exist.
    pub async fn delete_session(&self, session_id: i64) -> Result<bool, CoreError> {
        let deleted = self.repo.delete_session(session_id).await?;
        if deleted {
            info!(session_id, "Deleted session");
        }
        Ok(deleted)
    }

    /// Continue an existing matching session or start a fresh one.
    ///
    /// The subset-context match in `find_session` is what makes repeated
    /// calls with the same context land on the same session instead of
    /// spawning duplicates.
    pub async fn find_or_create(
        &self,
        user_id: &str,
        name: &str,
        session_type: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<i64, CoreError> {
        let filter = context.and_then(serde_json::Value::as_object);

        if let Some(existing) = self.repo.find_session(user_id, session_type, filter).await? {
            return Ok(existing.id);
        }

        self.create_session(user_id, name, session_type, context)
            .await
    }
}
