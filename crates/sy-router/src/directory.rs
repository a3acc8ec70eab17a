//! Worker directory - the external source of worker availability

use async_trait::async_trait;
use dashmap::DashMap;

use sy_common::WorkerInfo;

use crate::error::DirectoryError;

/// Answers "which workers exist right now". Lookups may suspend; the core
/// never holds its state while one is outstanding.
#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    async fn workers(&self) -> Result<Vec<WorkerInfo>, DirectoryError>;
}

/// In-memory directory seeded from configuration and updated in place
#[derive(Debug, Default)]
pub struct StaticWorkerDirectory {
    workers: DashMap<String, WorkerInfo>,
}

impl StaticWorkerDirectory {
    pub fn new(workers: impl IntoIterator<Item = WorkerInfo>) -> Self {
        let directory = Self::default();
        for worker in workers {
            directory.upsert(worker);
        }
        directory
    }

    pub fn upsert(&self, worker: WorkerInfo) {
        self.workers.insert(worker.id.clone(), worker);
    }

    pub fn remove(&self, worker_id: &str) -> Option<WorkerInfo> {
        self.workers.remove(worker_id).map(|(_, w)| w)
    }

    /// Returns false if the worker is unknown.
    pub fn set_online(&self, worker_id: &str, online: bool) -> bool {
        match self.workers.get_mut(worker_id) {
            Some(mut worker) => {
                worker.online = online;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[async_trait]
impl WorkerDirectory for StaticWorkerDirectory {
    async fn workers(&self) -> Result<Vec<WorkerInfo>, DirectoryError> {
        let mut workers: Vec<WorkerInfo> = self.workers.iter().map(|e| e.value().clone()).collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workers)
    }
}
