use thiserror::Error;

/// Errors from either registry backend. Per spec, registry errors are
/// logged by callers and are never fatal to the relay — this type exists so
/// that logging call sites have a real `Display` message to log instead of
/// a bare `String`.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to open embedded store: {0}")]
    OpenEmbedded(#[source] rusqlite::Error),

    #[error("embedded store query failed: {0}")]
    Embedded(#[source] rusqlite::Error),

    #[error("failed to connect to networked store: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("networked store query failed: {0}")]
    Networked(#[source] sqlx::Error),

    #[error("background task for embedded store query was cancelled: {0}")]
    TaskJoin(#[source] tokio::task::JoinError),
}
