//! Runs a relay in-process against an in-memory registry, for tests and
//! local development -- the direct analogue of the teacher's
//! `embedded::run_embedded_server`/`EmbeddedFloServer`, which lets an
//! application exercise the server "without a dependency on an external
//! server." Here that means an in-memory SQLite registry and a listener
//! bound to an OS-assigned loopback port, rather than a fabricated in-memory
//! transport -- participants still connect over real (local) TCP, since that
//! is the one transport `Participant` speaks.

use std::sync::Arc;

use conga_registry::sqlite::SqliteRegistry;
use conga_registry::{CongaId, MemberId, Registry};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::engine::Engine;
use crate::{acceptor, participant};

/// A running relay plus the handles tests need to drive it: the address to
/// connect participants to, and the registry to seed membership rows in.
pub struct EmbeddedRelay {
    pub addr: std::net::SocketAddr,
    pub registry: Arc<SqliteRegistry>,
    engine: Engine,
    accept_task: JoinHandle<()>,
}

impl EmbeddedRelay {
    /// Seeds a membership row directly, bypassing the out-of-scope registry
    /// service that would normally write it.
    pub fn seed(&self, member_id: MemberId, conga_id: CongaId) {
        self.registry.seed(member_id, conga_id).expect("in-memory sqlite seed");
    }

    pub async fn conga_count(&self) -> usize {
        self.engine.conga_count().await
    }

    pub fn shutdown(self) {
        self.accept_task.abort();
    }
}

/// Starts an embedded relay bound to an ephemeral loopback port, backed by a
/// fresh in-memory SQLite registry.
pub async fn start() -> std::io::Result<EmbeddedRelay> {
    let engine = Engine::new();
    let registry = Arc::new(SqliteRegistry::open_in_memory().expect("in-memory sqlite open"));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let accept_engine = engine.clone();
    let accept_registry: Arc<dyn Registry> = registry.clone();
    let accept_task = tokio::spawn(async move {
        let mut connection_ids = crate::atomics::AtomicCounterWriter::zero();
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let connection_id = connection_ids.increment_and_get_relaxed(1);
                    let engine = accept_engine.clone();
                    let registry = accept_registry.clone();
                    tokio::spawn(async move {
                        participant::run(connection_id, stream, engine, registry).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    Ok(EmbeddedRelay {
        addr,
        registry,
        engine,
        accept_task,
    })
}

/// Builds the process-wide `Engine` and registry for a fully configured
/// relay and hands them to [`acceptor::run`]. This is what `main` calls;
/// `start` above is the test-only shortcut that skips CLI parsing and signal
/// handling.
pub async fn run_configured(config: RelayConfig) -> std::io::Result<()> {
    let engine = Engine::new();
    let registry = acceptor::build_registry(&config.registry)
        .await
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
    acceptor::run(config, engine, registry).await
}
