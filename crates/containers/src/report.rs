//! Outcomes of container operations.

use chrono::{DateTime, Utc};
use envstarter_core::{
    summarize_launch, ContainerId, ContainerState, ContainerStats, DesktopHandle, EnvError,
    LaunchFailure, MetricsSnapshot,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchedItem {
    pub label: String,
    pub pid: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub container_id: ContainerId,
    pub environment: String,
    pub total_items: usize,
    pub launched: Vec<LaunchedItem>,
    pub failures: Vec<LaunchFailure>,
    pub state: ContainerState,
    pub desktop: Option<DesktopHandle>,
}

impl StartReport {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }

    pub fn summary(&self) -> String {
        summarize_launch(self.launched.len(), self.total_items, &self.failures)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StopReport {
    pub container_id: ContainerId,
    pub terminated: usize,
    pub detached: usize,
    pub unconfirmed: Vec<u32>,
    /// The container was already stopped; nothing was done.
    pub noop: bool,
}

impl StopReport {
    pub fn noop(container_id: ContainerId) -> Self {
        Self {
            container_id,
            noop: true,
            ..Self::default()
        }
    }

    pub fn fully_confirmed(&self) -> bool {
        self.unconfirmed.is_empty()
    }

    /// `TerminationTimeout` when some pids could not be confirmed gone.
    pub fn timeout_error(&self) -> Option<EnvError> {
        if self.unconfirmed.is_empty() {
            None
        } else {
            Some(EnvError::TerminationTimeout {
                id: self.container_id.clone(),
                pids: self.unconfirmed.clone(),
            })
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResumeReport {
    pub resumed: usize,
    /// Processes that died while the container was paused.
    pub dropped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub environment_id: String,
    pub environment_name: String,
    pub state: ContainerState,
    pub desktop: Option<DesktopHandle>,
    pub stats: ContainerStats,
    pub failures: Vec<LaunchFailure>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Registry-wide aggregate over non-terminal containers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemStatus {
    pub total_containers: usize,
    pub max_containers: usize,
    pub running: usize,
    pub paused: usize,
    pub total_processes: usize,
    pub total_memory_bytes: u64,
    pub total_cpu_percent: f32,
    pub active_desktops: usize,
    pub active_container: Option<ContainerId>,
    pub metrics: MetricsSnapshot,
}
