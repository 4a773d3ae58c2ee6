//! The relay: accepts participant connections, maintains one conga ring per
//! `conga_id`, and forwards `MSG` frames hop-by-hop until they return to
//! their originator.

pub mod acceptor;
pub mod atomics;
pub mod config;
pub mod conga;
pub mod embedded;
pub mod engine;
pub mod participant;

pub use config::{RegistryBackend, RelayConfig};
pub use conga::{Conga, JoinError, LeaveError};
pub use engine::{ConnectionId, Engine};
pub use participant::ParticipantHandle;
