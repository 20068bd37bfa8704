//! Session row CRUD and usage accounting.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::database::Database;
use crate::error::{CoreError, Result};

/// Session metadata as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

pub struct SessionStore<'a> {
    db: &'a Database,
}

impl<'a> SessionStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new session. The id is caller-chosen and must be unique.
    pub fn create(&self, id: &str, name: &str, model: &str) -> Result<SessionInfo> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.db.conn().execute(
            "INSERT OR IGNORE INTO sessions (id, name, model, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, name, model, now],
        )?;
        if inserted == 0 {
            return Err(CoreError::SessionConflict(format!(
                "session '{}' already exists",
                id
            )));
        }
        self.get(id)?
            .ok_or_else(|| CoreError::Persistence("created session row missing".into()))
    }

    pub fn get(&self, id: &str) -> Result<Option<SessionInfo>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, name, model, created_at, updated_at, input_tokens, output_tokens, cost_usd
             FROM sessions WHERE id = ?1",
        )?;
        let row = stmt.query_row([id], map_session_row);
        match row {
            Ok(info) => Ok(Some(info)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list(&self) -> Result<Vec<SessionInfo>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, name, model, created_at, updated_at, input_tokens, output_tokens, cost_usd
             FROM sessions ORDER BY updated_at DESC",
        )?;
        let sessions = stmt
            .query_map([], map_session_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    pub fn touch(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(())
    }

    /// Delete the metadata row; turns and checkpoints cascade.
    pub fn delete(&self, id: &str) -> Result<()> {
        let deleted = self
            .db
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(CoreError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }
}

pub(crate) fn map_session_row(row: &rusqlite::Row) -> rusqlite::Result<SessionInfo> {
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(SessionInfo {
        id: row.get(0)?,
        name: row.get(1)?,
        model: row.get(2)?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
        input_tokens: row.get::<_, i64>(5)? as u64,
        output_tokens: row.get::<_, i64>(6)? as u64,
        cost_usd: row.get(7)?,
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
