//! Lifecycle notifications fanned out to any number of subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::types::ContainerId;

pub const DEFAULT_EVENT_CHANNEL_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LifecycleEvent {
    ContainerStarted {
        container_id: ContainerId,
        environment: String,
        launched: usize,
        failed: usize,
    },
    ContainerStopped {
        container_id: ContainerId,
        unconfirmed: Vec<u32>,
    },
    ContainerPaused {
        container_id: ContainerId,
    },
    ContainerResumed {
        container_id: ContainerId,
        dropped: usize,
    },
    ContainerSwitched {
        container_id: ContainerId,
        desktop_index: u32,
    },
    ItemLaunched {
        container_id: ContainerId,
        item: String,
        pid: u32,
    },
    ItemLaunchFailed {
        container_id: ContainerId,
        item: String,
        reason: String,
    },
    ProcessExited {
        container_id: ContainerId,
        pid: u32,
        label: String,
    },
    ContainerError {
        container_id: ContainerId,
        message: String,
    },
    CapacityReached {
        max: usize,
    },
    BatchStarted {
        batch: usize,
        size: usize,
    },
    BatchCompleted {
        batch: usize,
        succeeded: usize,
        failed: usize,
    },
}

/// Cheap to clone; every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    /// Never blocks and never fails the caller.
    pub fn emit(&self, event: LifecycleEvent) {
        if let Err(e) = self.tx.send(event) {
            // No receivers is the normal case when nobody is listening
            if self.tx.receiver_count() > 0 {
                warn!("Failed to broadcast lifecycle event: {}", e);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CHANNEL_SIZE)
    }
}
