//! registry.rs
//!
//! Owns the "current" `VectorIndexState`.
//!
//! Lifecycle: created with the state loaded at startup (or an empty one),
//! replaced wholesale by each successful rebuild, and dropped with the engine.
//! Readers clone the `Arc` and keep using it for as long as they need; a
//! publish never touches a state that has already been handed out.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::index::vector_index::VectorIndexState;

pub struct IndexHandle {
    current: RwLock<Arc<VectorIndexState>>,
}

impl IndexHandle {
    pub fn new(initial: VectorIndexState) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The published state. The lock is held only for the `Arc` clone.
    pub fn current(&self) -> Arc<VectorIndexState> {
        let guard = self.current.read();
        Arc::clone(&*guard)
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation()
    }

    /// Swaps in a fully built state and returns the one it replaced.
    pub fn publish(&self, next: Arc<VectorIndexState>) -> Arc<VectorIndexState> {
        let previous = {
            let mut guard = self.current.write();
            std::mem::replace(&mut *guard, next)
        };
        debug!(
            "published generation {} (replaced {})",
            self.generation(),
            previous.generation()
        );
        previous
    }
}
