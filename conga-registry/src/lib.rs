//! Registry adapter: the external, authoritative store mapping
//! `member_id -> conga_id`, queried on HELLO and updated on BYE.
//!
//! Two backends implement the same [`Registry`] trait with identical
//! semantics: [`sqlite::SqliteRegistry`] (embedded, for development) and
//! [`postgres::PostgresRegistry`] (networked, for production). The relay
//! compiles against the trait only.

pub mod error;
pub mod postgres;
pub mod sqlite;

pub use error::RegistryError;

pub type MemberId = i64;
pub type CongaId = i64;

/// Read/delete operations the relay performs against the registry.
///
/// `lookup_conga` backs HELLO handling; `delete_membership` backs BYE
/// cleanup. Implementations must substitute query parameters themselves —
/// callers never interpolate values into query text.
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Resolves the conga a member belongs to, or `Ok(None)` if there is no
    /// such row.
    async fn lookup_conga(&self, member_id: MemberId) -> Result<Option<CongaId>, RegistryError>;

    /// Deletes a member's registry row. Idempotent: deleting an
    /// already-absent row is not an error.
    async fn delete_membership(&self, member_id: MemberId) -> Result<(), RegistryError>;
}
