//! Read-only view of the workers that may act on or receive tickets.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::state_machine::{Worker, WorkerId};

/// Source of worker identities. The core only ever reads from it.
pub trait WorkerDirectory: Send + Sync {
    fn find_worker(&self, id: WorkerId) -> Option<Worker>;

    /// Active masters ordered by id.
    fn masters(&self) -> Vec<Worker>;
}

/// In-process directory, populated from seeds or tests.
#[derive(Default)]
pub struct MemoryDirectory {
    workers: RwLock<HashMap<WorkerId, Worker>>,
}

impl MemoryDirectory {
    pub fn new(workers: impl IntoIterator<Item = Worker>) -> Self {
        Self {
            workers: RwLock::new(workers.into_iter().map(|w| (w.id, w)).collect()),
        }
    }

    /// Mark a worker inactive. Returns `false` if the id is unknown.
    pub fn deactivate(&self, id: WorkerId) -> bool {
        match self.workers.write().get_mut(&id) {
            Some(worker) => {
                worker.active = false;
                true
            }
            None => false,
        }
    }
}

impl WorkerDirectory for MemoryDirectory {
    fn find_worker(&self, id: WorkerId) -> Option<Worker> {
        self.workers.read().get(&id).cloned()
    }

    fn masters(&self) -> Vec<Worker> {
        let mut masters: Vec<Worker> = self
            .workers
            .read()
            .values()
            .filter(|w| w.is_assignable())
            .cloned()
            .collect();
        masters.sort_by_key(|w| w.id);
        masters
    }
}
