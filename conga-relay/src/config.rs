//! CLI and environment configuration, parsed with `clap`'s derive API with
//! `CONGA_`-prefixed environment fallbacks on every flag -- the modern
//! analogue of the teacher's `clap::App`-built `ServerOptions`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "conga-relay", about = "Relays MSG frames around conga rings")]
pub struct Cli {
    /// Address to listen for participant connections on.
    #[arg(long, env = "CONGA_BIND_ADDR", default_value = "0.0.0.0:8888")]
    pub bind_addr: SocketAddr,

    /// How long, in seconds, to let inflight frames drain on SIGINT/SIGTERM
    /// before the process exits.
    #[arg(long, env = "CONGA_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    #[command(subcommand)]
    pub registry: RegistryBackendArgs,
}

#[derive(Debug, Subcommand)]
pub enum RegistryBackendArgs {
    /// Embedded SQLite store, for development.
    Sqlite {
        #[arg(long, env = "CONGA_SQLITE_PATH")]
        path: PathBuf,
    },
    /// Networked PostgreSQL store, for production.
    Postgres {
        #[arg(long, env = "CONGA_PG_HOST", default_value = "localhost")]
        host: String,
        #[arg(long, env = "CONGA_PG_PORT", default_value_t = 5432)]
        port: u16,
        #[arg(long, env = "CONGA_PG_USER")]
        user: String,
        #[arg(long, env = "CONGA_PG_PASSWORD")]
        password: String,
        #[arg(long, env = "CONGA_PG_DBNAME")]
        dbname: String,
    },
}

/// The fully-resolved configuration the relay runs with, distinct from the
/// raw `Cli` struct so that `conga-relay::embedded` (which never goes through
/// `clap`) can build one directly.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub registry: RegistryBackend,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone)]
pub enum RegistryBackend {
    Sqlite { path: PathBuf },
    Postgres {
        host: String,
        port: u16,
        user: String,
        password: String,
        dbname: String,
    },
}

impl From<Cli> for RelayConfig {
    fn from(cli: Cli) -> RelayConfig {
        let registry = match cli.registry {
            RegistryBackendArgs::Sqlite { path } => RegistryBackend::Sqlite { path },
            RegistryBackendArgs::Postgres {
                host,
                port,
                user,
                password,
                dbname,
            } => RegistryBackend::Postgres {
                host,
                port,
                user,
                password,
                dbname,
            },
        };

        RelayConfig {
            bind_addr: cli.bind_addr,
            registry,
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
        }
    }
}
