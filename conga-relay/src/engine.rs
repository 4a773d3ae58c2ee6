//! Process-wide state shared by every connection: the `conga_id -> Conga`
//! map. Grounded in the teacher's `EngineRef` (`flo-server/src/engine/mod.rs`):
//! a small, cheaply-`Clone`-able handle, backed by `Arc`s, that every
//! connection task holds a copy of.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use conga_registry::CongaId;

use crate::conga::Conga;

pub type ConnectionId = usize;
pub type CongaHandle = Arc<Mutex<Conga>>;

/// Shared handle to the relay's congas. Cloning is cheap; every clone refers
/// to the same underlying map.
#[derive(Clone)]
pub struct Engine {
    congas: Arc<Mutex<HashMap<CongaId, CongaHandle>>>,
}

impl Engine {
    pub fn new() -> Engine {
        Engine {
            congas: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the conga for `conga_id`, creating an empty one on first use.
    /// Per spec, an emptied conga is never removed from this map -- it may
    /// sit resident with zero participants indefinitely (see DESIGN.md).
    pub async fn get_or_create_conga(&self, conga_id: CongaId) -> CongaHandle {
        let mut congas = self.congas.lock().await;
        congas
            .entry(conga_id)
            .or_insert_with(|| Arc::new(Mutex::new(Conga::new(conga_id))))
            .clone()
    }

    /// Number of distinct congas currently resident, including empty ones.
    /// Exposed for the embedded harness and for diagnostics.
    pub async fn conga_count(&self) -> usize {
        self.congas.lock().await.len()
    }
}

impl Default for Engine {
    fn default() -> Engine {
        Engine::new()
    }
}
