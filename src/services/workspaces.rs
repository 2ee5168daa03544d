//! Per-workspace instance table
//!
//! At most one instance per workspace. A start in progress is recorded as
//! `Starting` so concurrent callers wait for it instead of launching a
//! second backend.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::error::BackendError;
use crate::infra::ProtocolProcess;
use crate::infra::process::WireProtocol;
use crate::models::WorkspaceFolder;

enum Slot<T> {
    Starting(watch::Receiver<bool>),
    Running(Arc<T>),
}

pub struct WorkspaceTable<T> {
    slots: RwLock<HashMap<WorkspaceFolder, Slot<T>>>,
}

impl<T> Default for WorkspaceTable<T> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> WorkspaceTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Running instance for `workspace`, starting one with `start` if absent.
    /// The flag is true when this call performed the start.
    pub async fn get_or_start<F, Fut>(
        &self,
        workspace: &WorkspaceFolder,
        start: F,
    ) -> Result<(Arc<T>, bool), BackendError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, BackendError>>,
    {
        loop {
            // Phase 1: look up under the read lock, release immediately
            let waiting = {
                let slots = self.slots.read().await;
                match slots.get(workspace) {
                    Some(Slot::Running(instance)) => return Ok((Arc::clone(instance), false)),
                    Some(Slot::Starting(rx)) => Some(rx.clone()),
                    None => None,
                }
            };

            // Phase 2: another caller is starting; wait for it and re-check
            if let Some(rx) = waiting {
                self.wait_settled(workspace, rx).await;
                continue;
            }

            // Phase 3: claim the slot
            let (tx, rx) = watch::channel(false);
            {
                let mut slots = self.slots.write().await;
                if slots.contains_key(workspace) {
                    continue; // Race: another caller claimed it, retry
                }
                slots.insert(workspace.clone(), Slot::Starting(rx.clone()));
            }

            let result = start().await;

            let mut slots = self.slots.write().await;
            let ours = matches!(slots.get(workspace), Some(Slot::Starting(r)) if r.same_channel(&rx));
            match &result {
                Ok(instance) if ours => {
                    slots.insert(workspace.clone(), Slot::Running(Arc::clone(instance)));
                }
                _ if ours => {
                    slots.remove(workspace);
                }
                _ => {}
            }
            let _ = tx.send(true);

            return result.map(|instance| (instance, true));
        }
    }

    async fn wait_settled(&self, workspace: &WorkspaceFolder, mut rx: watch::Receiver<bool>) {
        if rx.wait_for(|settled| *settled).await.is_err() {
            // Starter was cancelled before settling; free the slot
            let mut slots = self.slots.write().await;
            if matches!(slots.get(workspace), Some(Slot::Starting(r)) if r.same_channel(&rx)) {
                slots.remove(workspace);
            }
        }
    }

    /// Running instance, if any
    pub async fn get(&self, workspace: &WorkspaceFolder) -> Option<Arc<T>> {
        match self.slots.read().await.get(workspace) {
            Some(Slot::Running(instance)) => Some(Arc::clone(instance)),
            _ => None,
        }
    }

    /// Remove and return the instance, waiting out a start in progress
    pub async fn take(&self, workspace: &WorkspaceFolder) -> Option<Arc<T>> {
        loop {
            let waiting = {
                let mut slots = self.slots.write().await;
                match slots.get(workspace) {
                    Some(Slot::Running(_)) => {
                        return match slots.remove(workspace) {
                            Some(Slot::Running(instance)) => Some(instance),
                            _ => None,
                        };
                    }
                    Some(Slot::Starting(rx)) => rx.clone(),
                    None => return None,
                }
            };
            self.wait_settled(workspace, waiting).await;
        }
    }

    /// Remove the entry only if it still holds `instance`
    pub async fn remove_if_same(&self, workspace: &WorkspaceFolder, instance: &Arc<T>) -> bool {
        loop {
            let waiting = {
                let mut slots = self.slots.write().await;
                match slots.get(workspace) {
                    Some(Slot::Running(current)) if Arc::ptr_eq(current, instance) => {
                        slots.remove(workspace);
                        return true;
                    }
                    Some(Slot::Starting(rx)) => rx.clone(),
                    _ => return false,
                }
            };
            self.wait_settled(workspace, waiting).await;
        }
    }

    /// Workspaces with a running instance
    pub async fn folders(&self) -> Vec<WorkspaceFolder> {
        let slots = self.slots.read().await;
        let mut folders: Vec<WorkspaceFolder> = slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Running(_)))
            .map(|(workspace, _)| workspace.clone())
            .collect();
        folders.sort();
        folders
    }

    /// Every claimed workspace, starts in progress included
    pub async fn keys(&self) -> Vec<WorkspaceFolder> {
        let mut keys: Vec<WorkspaceFolder> = self.slots.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl<P: WireProtocol> WorkspaceTable<ProtocolProcess<P>> {
    /// Drop the entry once the backend exits on its own
    pub fn evict_on_exit(self: &Arc<Self>, process: &Arc<ProtocolProcess<P>>) {
        let table = Arc::clone(self);
        let process = Arc::clone(process);
        tokio::spawn(async move {
            process.closed().await;
            if table.remove_if_same(process.workspace(), &process).await {
                tracing::warn!(
                    "{} backend for {} is gone; entry removed",
                    process.language(),
                    process.workspace()
                );
            }
        });
    }
}
