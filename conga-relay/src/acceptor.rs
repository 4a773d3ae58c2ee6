//! The TCP accept loop. Grounded in the teacher's `server::run` accept loop
//! (`src/server/mod.rs`): bind a listener, hand each accepted stream a fresh
//! connection id from a single-writer counter, and spawn a task to drive it.
//! Graceful shutdown on SIGINT/SIGTERM is the direct `tokio::signal::unix`
//! analogue of the teacher's reactor-posted stop callback.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};

use conga_registry::{postgres::PostgresConfig, postgres::PostgresRegistry, sqlite::SqliteRegistry, Registry, RegistryError};

use crate::atomics::AtomicCounterWriter;
use crate::config::{RegistryBackend, RelayConfig};
use crate::engine::Engine;
use crate::participant;

/// Builds the configured registry backend. Both backends implement
/// [`Registry`] with identical semantics; the relay never compiles against
/// either concrete type beyond this point.
pub async fn build_registry(backend: &RegistryBackend) -> Result<Arc<dyn Registry>, RegistryError> {
    match backend {
        RegistryBackend::Sqlite { path } => {
            let registry = SqliteRegistry::open(path)?;
            Ok(Arc::new(registry))
        }
        RegistryBackend::Postgres {
            host,
            port,
            user,
            password,
            dbname,
        } => {
            let registry = PostgresRegistry::connect(&PostgresConfig {
                host: host.clone(),
                port: *port,
                user: user.clone(),
                password: password.clone(),
                dbname: dbname.clone(),
            })
            .await?;
            Ok(Arc::new(registry))
        }
    }
}

/// Runs the accept loop until a shutdown signal arrives. Stops accepting new
/// connections immediately on SIGINT/SIGTERM, then waits up to
/// `config.shutdown_grace` for inflight connection tasks to finish on their
/// own before returning.
pub async fn run(config: RelayConfig, engine: Engine, registry: Arc<dyn Registry>) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("listening on {}", config.bind_addr);

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let mut connection_ids = AtomicCounterWriter::zero();
    let mut inflight = Vec::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let connection_id = connection_ids.increment_and_get_relaxed(1);
                        info!("connection {}: accepted from {}", connection_id, addr);
                        let engine = engine.clone();
                        let registry = registry.clone();
                        inflight.push(tokio::spawn(async move {
                            participant::run(connection_id, stream, engine, registry).await;
                        }));
                    }
                    Err(err) => {
                        error!("accept failed: {}", err);
                    }
                }
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
        }
    }

    drop(listener);
    let drain = tokio::time::timeout(config.shutdown_grace, futures::future::join_all(inflight)).await;
    if drain.is_err() {
        warn!("shutdown grace period elapsed with connections still inflight");
    }

    Ok(())
}
