//! Turn persistence.
//!
//! `append_with_usage` is the atomicity point: all turns of one loop
//! iteration and the usage counters commit in a single transaction, so a
//! crash either replays the whole iteration or none of it.

use chrono::Utc;
use rusqlite::params;

use super::database::Database;
use crate::ai::types::{ModelMessage, Role, Usage};
use crate::error::{CoreError, Result};

pub struct TurnStore<'a> {
    db: &'a Database,
}

impl<'a> TurnStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append turns and fold usage into the session counters atomically.
    /// Also bumps `updated_at`.
    pub fn append_with_usage(
        &self,
        session_id: &str,
        turns: &[ModelMessage],
        usage: Usage,
        cost_usd: f64,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.db.conn().unchecked_transaction()?;

        for turn in turns {
            let content = serde_json::to_string(&turn.content)
                .map_err(|e| CoreError::Persistence(e.to_string()))?;
            tx.execute(
                "INSERT INTO turns (session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![session_id, turn.role.as_str(), content, now],
            )?;
        }

        let updated = tx.execute(
            "UPDATE sessions SET
                input_tokens  = input_tokens + ?1,
                output_tokens = output_tokens + ?2,
                cost_usd      = cost_usd + ?3,
                updated_at    = ?4
             WHERE id = ?5",
            params![
                usage.input_tokens as i64,
                usage.output_tokens as i64,
                cost_usd,
                now,
                session_id
            ],
        )?;
        if updated == 0 {
            return Err(CoreError::SessionNotFound(session_id.to_string()));
        }

        tx.commit()?;
        Ok(())
    }

    /// Load the full history in insertion order.
    pub fn load(&self, session_id: &str) -> Result<Vec<ModelMessage>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT role, content FROM turns WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut turns = Vec::new();
        for row in rows {
            let (role_str, content_json) = row?;
            let Some(role) = Role::parse(&role_str) else {
                tracing::warn!(role = %role_str, "skipping turn with unknown role");
                continue;
            };
            match serde_json::from_str(&content_json) {
                Ok(content) => turns.push(ModelMessage { role, content }),
                Err(e) => {
                    tracing::warn!(session_id, "skipping unparseable turn: {}", e);
                }
            }
        }
        Ok(turns)
    }

    pub fn count(&self, session_id: &str) -> Result<usize> {
        let n: i64 = self.db.conn().query_row(
            "SELECT COUNT(*) FROM turns WHERE session_id = ?1",
            [session_id],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }
}
