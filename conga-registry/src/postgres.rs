//! Networked relational backend, for production. Grounded in
//! `original_source/tornado_server/db/postgres.py`; unlike the Python
//! version (synchronous `psycopg2`), this one is fully async against the
//! `tokio` runtime via `sqlx`, matching spec §9's expectation that "the
//! production backend is expected to be non-blocking."

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::{CongaId, MemberId, Registry, RegistryError};

/// Connection parameters for the networked store.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

impl PostgresConfig {
    fn connection_url(&self) -> String {
        format!(
            "postgres://{user}:{password}@{host}:{port}/{dbname}",
            user = self.user,
            password = self.password,
            host = self.host,
            port = self.port,
            dbname = self.dbname,
        )
    }
}

#[derive(Clone)]
pub struct PostgresRegistry {
    pool: PgPool,
}

impl PostgresRegistry {
    pub async fn connect(config: &PostgresConfig) -> Result<PostgresRegistry, RegistryError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&config.connection_url())
            .await
            .map_err(RegistryError::Connect)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS members (
                member_id BIGINT PRIMARY KEY,
                conga_id BIGINT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(RegistryError::Connect)?;

        Ok(PostgresRegistry { pool })
    }

    /// Wraps an already-established pool. Useful for tests that want to
    /// point at a disposable database without going through `connect`'s
    /// URL-building.
    pub fn from_pool(pool: PgPool) -> PostgresRegistry {
        PostgresRegistry { pool }
    }
}

#[async_trait::async_trait]
impl Registry for PostgresRegistry {
    async fn lookup_conga(&self, member_id: MemberId) -> Result<Option<CongaId>, RegistryError> {
        sqlx::query_scalar::<_, i64>("SELECT conga_id FROM members WHERE member_id = $1")
            .bind(member_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RegistryError::Networked)
    }

    async fn delete_membership(&self, member_id: MemberId) -> Result<(), RegistryError> {
        sqlx::query("DELETE FROM members WHERE member_id = $1")
            .bind(member_id)
            .execute(&self.pool)
            .await
            .map_err(RegistryError::Networked)?;
        Ok(())
    }
}
