//! Embedded single-file backend, for development. Grounded in
//! `original_source/tornado_server/db/sqlite.py`: synchronous, with the
//! same caveat the Python docstring calls out — it's fine for development
//! but the production backend is the networked one in `postgres`.
//!
//! `rusqlite` is synchronous, so every query runs on a blocking-pool task
//! via `tokio::task::spawn_blocking`, keeping the reactor free per the
//! concurrency model's "Registry I/O, if synchronous, must be fast" rule.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use crate::{CongaId, MemberId, Registry, RegistryError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS members (
    member_id INTEGER PRIMARY KEY,
    conga_id INTEGER NOT NULL
)";

#[derive(Clone)]
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<SqliteRegistry, RegistryError> {
        let conn = Connection::open(path).map_err(RegistryError::OpenEmbedded)?;
        conn.execute_batch(SCHEMA).map_err(RegistryError::OpenEmbedded)?;
        Ok(SqliteRegistry {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens a private in-memory database. Used by the embedded relay
    /// harness (`conga_relay::embedded`) and by this crate's own tests.
    pub fn open_in_memory() -> Result<SqliteRegistry, RegistryError> {
        let conn = Connection::open_in_memory().map_err(RegistryError::OpenEmbedded)?;
        conn.execute_batch(SCHEMA).map_err(RegistryError::OpenEmbedded)?;
        Ok(SqliteRegistry {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Seeds a membership row directly. In production this row is written
    /// by the out-of-scope registry service; tests and the embedded
    /// harness use this instead.
    pub fn seed(&self, member_id: MemberId, conga_id: CongaId) -> Result<(), RegistryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO members (member_id, conga_id) VALUES (?1, ?2)",
            params![member_id, conga_id],
        )
        .map_err(RegistryError::Embedded)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Registry for SqliteRegistry {
    async fn lookup_conga(&self, member_id: MemberId) -> Result<Option<CongaId>, RegistryError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.query_row(
                "SELECT conga_id FROM members WHERE member_id = ?1",
                params![member_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(RegistryError::Embedded)
        })
        .await
        .map_err(RegistryError::TaskJoin)?
    }

    async fn delete_membership(&self, member_id: MemberId) -> Result<(), RegistryError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute("DELETE FROM members WHERE member_id = ?1", params![member_id])
                .map_err(RegistryError::Embedded)?;
            Ok(())
        })
        .await
        .map_err(RegistryError::TaskJoin)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_none_for_unknown_member() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        assert_eq!(registry.lookup_conga(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn seeded_member_resolves_its_conga() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        registry.seed(1, 42).unwrap();
        assert_eq!(registry.lookup_conga(1).await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        registry.seed(1, 42).unwrap();
        registry.delete_membership(1).await.unwrap();
        assert_eq!(registry.lookup_conga(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        registry.delete_membership(1).await.unwrap();
        registry.delete_membership(1).await.unwrap();
    }
}
