//! Per-transport checkpoint blobs.
//!
//! A checkpoint is an opaque serialized snapshot keyed by (session,
//! transport). Write failures are fatal to the in-flight turn; a missing or
//! unreadable checkpoint reads back as `None` (new-session semantics).

use chrono::Utc;
use rusqlite::params;

use super::database::Database;
use crate::error::Result;

pub struct CheckpointStore<'a> {
    db: &'a Database,
}

impl<'a> CheckpointStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn save(&self, session_id: &str, transport: &str, blob: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO checkpoints (session_id, transport, blob, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id, transport)
             DO UPDATE SET blob = ?3, updated_at = ?4",
            params![session_id, transport, blob, now],
        )?;
        Ok(())
    }

    pub fn load(&self, session_id: &str, transport: &str) -> Result<Option<String>> {
        let row = self.db.conn().query_row(
            "SELECT blob FROM checkpoints WHERE session_id = ?1 AND transport = ?2",
            params![session_id, transport],
            |r| r.get::<_, String>(0),
        );
        match row {
            Ok(blob) => Ok(Some(blob)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => {
                tracing::warn!(session_id, transport, "checkpoint read failed: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sessions::SessionStore;

    #[test]
    fn save_is_upsert_and_transport_scoped() {
        let db = Database::open_in_memory().unwrap();
        SessionStore::new(&db).create("s1", "S", "m").unwrap();
        let store = CheckpointStore::new(&db);

        store.save("s1", "web", "{\"cursor\":1}").unwrap();
        store.save("s1", "web", "{\"cursor\":2}").unwrap();
        store.save("s1", "mcp", "{\"cursor\":9}").unwrap();

        assert_eq!(store.load("s1", "web").unwrap().unwrap(), "{\"cursor\":2}");
        assert_eq!(store.load("s1", "mcp").unwrap().unwrap(), "{\"cursor\":9}");
        assert!(store.load("s1", "ws").unwrap().is_none());
    }
}
