//! Session lifecycle and cross-transport coordination.
//!
//! `SessionManager` is the single entry point for session state: metadata
//! CRUD, history, usage accounting, checkpoints, per-transport "current
//! session" cursors and the per-session write lock that serializes turns.
//! Transport cursors are in-core only; durable state is the database and the
//! workspace directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::ai::types::{ModelMessage, Usage};
use crate::error::{CoreError, Result};
use crate::storage::{CheckpointStore, Database, SessionInfo, SessionStore, TurnStore};
use crate::workspace::Workspace;

/// USD per million tokens, used for the running cost estimate when the
/// provider reports usage but not price.
const INPUT_COST_PER_MTOK: f64 = 3.0;
const OUTPUT_COST_PER_MTOK: f64 = 15.0;

pub struct SessionManager {
    db_path: PathBuf,
    workspace_root: PathBuf,
    /// transport tag → current session id.
    active: RwLock<HashMap<String, String>>,
    /// session id → turn-serialization lock.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(db_path: PathBuf, workspace_root: PathBuf) -> Self {
        Self {
            db_path,
            workspace_root,
            active: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn db(&self) -> Result<Database> {
        Database::open(&self.db_path)
    }

    pub fn workspace(&self, session_id: &str) -> Workspace {
        Workspace::new(&self.workspace_root, session_id)
    }

    pub async fn create(&self, id: &str, name: &str, model: &str) -> Result<SessionInfo> {
        validate_session_id(id)?;
        let db = self.db()?;
        let info = SessionStore::new(&db).create(id, name, model)?;
        self.workspace(id).ensure_dir().await?;
        tracing::info!(session_id = %id, model, "session created");
        Ok(info)
    }

    pub fn open(&self, id: &str) -> Result<SessionInfo> {
        let db = self.db()?;
        SessionStore::new(&db)
            .get(id)?
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))
    }

    pub fn list(&self) -> Result<Vec<SessionInfo>> {
        let db = self.db()?;
        SessionStore::new(&db).list()
    }

    /// Delete a session. Refused while the session is the current session of
    /// any transport; the workspace directory goes away only after the row.
    pub async fn delete(&self, id: &str) -> Result<()> {
        {
            let active = self.active.read().await;
            if let Some((transport, _)) = active.iter().find(|(_, sid)| sid.as_str() == id) {
                return Err(CoreError::SessionConflict(format!(
                    "session '{}' is active on transport '{}'",
                    id, transport
                )));
            }
        }

        let db = self.db()?;
        SessionStore::new(&db).delete(id)?;
        self.workspace(id).remove_all().await?;
        self.locks.lock().await.remove(id);
        tracing::info!(session_id = %id, "session deleted");
        Ok(())
    }

    // ── Transport cursors ──────────────────────────────────────────────

    pub async fn set_active(&self, transport: &str, id: &str) -> Result<()> {
        // Must exist before it can become current.
        self.open(id)?;
        self.active
            .write()
            .await
            .insert(transport.to_string(), id.to_string());
        Ok(())
    }

    pub async fn current_of(&self, transport: &str) -> Option<String> {
        self.active.read().await.get(transport).cloned()
    }

    pub async fn clear_active(&self, transport: &str) {
        self.active.write().await.remove(transport);
    }

    /// Resolve the transport's current session, lazily creating one when the
    /// transport has no cursor yet.
    pub async fn current_or_create(&self, transport: &str, model: &str) -> Result<SessionInfo> {
        if let Some(id) = self.current_of(transport).await {
            if let Ok(info) = self.open(&id) {
                return Ok(info);
            }
        }
        let id = format!("{}-{}", transport, &uuid::Uuid::new_v4().to_string()[..8]);
        let info = self.create(&id, &id, model).await?;
        self.set_active(transport, &id).await?;
        Ok(info)
    }

    // ── Turn serialization ─────────────────────────────────────────────

    /// Lock guarding writes for one session. Turns within a session run one
    /// at a time; different sessions proceed in parallel.
    pub async fn turn_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ── History + usage ────────────────────────────────────────────────

    pub fn history(&self, id: &str) -> Result<Vec<ModelMessage>> {
        let db = self.db()?;
        TurnStore::new(&db).load(id)
    }

    /// Append turns and fold usage in one transaction.
    pub fn append_turns(&self, id: &str, turns: &[ModelMessage], usage: Usage) -> Result<()> {
        let db = self.db()?;
        let cost = estimate_cost(usage);
        TurnStore::new(&db).append_with_usage(id, turns, usage, cost)
    }

    pub fn record_usage(&self, id: &str, usage: Usage) -> Result<()> {
        self.append_turns(id, &[], usage)
    }

    /// Mark the session as touched by a mutating tool.
    pub fn touch(&self, id: &str) -> Result<()> {
        let db = self.db()?;
        SessionStore::new(&db).touch(id)
    }

    // ── Checkpoints ────────────────────────────────────────────────────

    pub fn save_checkpoint(&self, id: &str, transport: &str, blob: &str) -> Result<()> {
        let db = self.db()?;
        CheckpointStore::new(&db).save(id, transport, blob)
    }

    pub fn load_checkpoint(&self, id: &str, transport: &str) -> Result<Option<String>> {
        let db = self.db()?;
        CheckpointStore::new(&db).load(id, transport)
    }
}

fn estimate_cost(usage: Usage) -> f64 {
    usage.input_tokens as f64 / 1e6 * INPUT_COST_PER_MTOK
        + usage.output_tokens as f64 / 1e6 * OUTPUT_COST_PER_MTOK
}

fn validate_session_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 {
        return Err(CoreError::BadArgs(
            "session id must be 1-64 characters".into(),
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::BadArgs(
            "session id may only contain alphanumerics, '-' and '_'".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, SessionManager) {
        let dir = TempDir::new().unwrap();
        let mgr = SessionManager::new(dir.path().join("state.db"), dir.path().join("workspace"));
        (dir, mgr)
    }

    #[tokio::test]
    async fn create_delete_create_yields_empty_history() {
        let (_dir, mgr) = manager();
        mgr.create("counter", "Counter", "m").await.unwrap();
        mgr.append_turns(
            "counter",
            &[ModelMessage::user_text("hello")],
            Usage::default(),
        )
        .unwrap();
        mgr.delete("counter").await.unwrap();
        mgr.create("counter", "Counter", "m").await.unwrap();
        assert!(mgr.history("counter").unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_refuses_active_sessions() {
        let (_dir, mgr) = manager();
        mgr.create("fifo", "FIFO", "m").await.unwrap();
        mgr.set_active("web", "fifo").await.unwrap();

        let err = mgr.delete("fifo").await.unwrap_err();
        assert!(matches!(err, CoreError::SessionConflict(_)));

        mgr.clear_active("web").await;
        mgr.delete("fifo").await.unwrap();
    }

    #[tokio::test]
    async fn transport_cursors_are_independent() {
        let (_dir, mgr) = manager();
        mgr.create("a", "A", "m").await.unwrap();
        mgr.create("b", "B", "m").await.unwrap();
        mgr.set_active("web", "a").await.unwrap();
        mgr.set_active("mcp", "b").await.unwrap();

        assert_eq!(mgr.current_of("web").await.as_deref(), Some("a"));
        assert_eq!(mgr.current_of("mcp").await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn set_active_requires_existing_session() {
        let (_dir, mgr) = manager();
        let err = mgr.set_active("web", "ghost").await.unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn invalid_session_ids_are_rejected() {
        let (_dir, mgr) = manager();
        assert!(mgr.create("", "x", "m").await.is_err());
        assert!(mgr.create("has space", "x", "m").await.is_err());
        assert!(mgr.create("../escape", "x", "m").await.is_err());
    }

    #[tokio::test]
    async fn usage_accumulates_on_session_row() {
        let (_dir, mgr) = manager();
        mgr.create("s", "S", "m").await.unwrap();
        mgr.record_usage(
            "s",
            Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
        )
        .unwrap();
        mgr.record_usage(
            "s",
            Usage {
                input_tokens: 20,
                output_tokens: 10,
            },
        )
        .unwrap();
        let info = mgr.open("s").unwrap();
        assert_eq!(info.input_tokens, 120);
        assert_eq!(info.output_tokens, 60);
        assert!(info.cost_usd > 0.0);
    }
}
