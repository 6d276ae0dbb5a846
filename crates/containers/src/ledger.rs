use envstarter_core::ContainerId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Which container owns which root pid. A pid has at most one owner.
#[derive(Debug, Clone, Default)]
pub struct PidLedger {
    owners: Arc<Mutex<HashMap<u32, ContainerId>>>,
}

impl PidLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` as the owner of `pid`, returning the previous owner if it changed.
    pub fn claim(&self, pid: u32, id: &ContainerId) -> Option<ContainerId> {
        self.owners
            .lock()
            .insert(pid, id.clone())
            .filter(|previous| previous != id)
    }

    pub fn owns(&self, pid: u32, id: &ContainerId) -> bool {
        self.owners.lock().get(&pid) == Some(id)
    }

    pub fn owner(&self, pid: u32) -> Option<ContainerId> {
        self.owners.lock().get(&pid).cloned()
    }

    /// Release `pid`, but only on behalf of its current owner.
    pub fn release(&self, pid: u32, id: &ContainerId) {
        let mut owners = self.owners.lock();
        if owners.get(&pid) == Some(id) {
            owners.remove(&pid);
        }
    }

    pub fn len(&self) -> usize {
        self.owners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
