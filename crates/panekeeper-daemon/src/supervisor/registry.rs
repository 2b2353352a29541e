use panekeeper_types::{PanekeeperError, PanekeeperResult, WorkerStatus};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::worker::WorkerProcess;

/// Map of pane id to worker. Every read and write of worker state goes
/// through here, and each `update` runs under the write lock so transitions
/// for one pane never interleave.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerProcess>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, worker: WorkerProcess) -> PanekeeperResult<()> {
        let mut workers = self.workers.write();
        if workers.contains_key(&worker.pane_id) {
            return Err(PanekeeperError::AlreadyExists(format!(
                "worker '{}'",
                worker.pane_id
            )));
        }
        workers.insert(worker.pane_id.clone(), worker);
        Ok(())
    }

    pub fn get(&self, pane_id: &str) -> Option<WorkerProcess> {
        self.workers.read().get(pane_id).cloned()
    }

    pub fn contains(&self, pane_id: &str) -> bool {
        self.workers.read().contains_key(pane_id)
    }

    /// Run `f` against a worker without cloning it.
    pub fn read<R>(&self, pane_id: &str, f: impl FnOnce(&WorkerProcess) -> R) -> Option<R> {
        self.workers.read().get(pane_id).map(f)
    }

    pub fn update<R>(&self, pane_id: &str, f: impl FnOnce(&mut WorkerProcess) -> R) -> Option<R> {
        self.workers.write().get_mut(pane_id).map(f)
    }

    pub fn remove(&self, pane_id: &str) -> Option<WorkerProcess> {
        self.workers.write().remove(pane_id)
    }

    pub fn pane_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self) -> Vec<WorkerProcess> {
        let mut workers: Vec<WorkerProcess> = self.workers.read().values().cloned().collect();
        workers.sort_by(|a, b| a.pane_id.cmp(&b.pane_id));
        workers
    }

    pub fn count_in(&self, status: WorkerStatus) -> usize {
        self.workers
            .read()
            .values()
            .filter(|w| w.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }
}
