//! Persistence layer.
//!
//! SQLite-backed storage for session metadata, conversation turns and
//! per-transport checkpoints. One writer per session is enforced above this
//! layer by the session manager's locks; transactions here guarantee that a
//! loop iteration's turns and usage land together or not at all.

mod checkpoints;
mod database;
mod sessions;
mod turns;

pub use checkpoints::CheckpointStore;
pub use database::Database;
pub use sessions::{SessionInfo, SessionStore};
pub use turns::TurnStore;
