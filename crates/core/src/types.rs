use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ItemKind;

/// Registry key for a container. Stable for the container's lifetime.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<slug of name>-<random suffix>`, e.g. `dev-3f2a9c1e7b04`.
    pub fn generate(environment_name: &str) -> Self {
        let mut slug = String::with_capacity(environment_name.len());
        let mut last_dash = true;
        for ch in environment_name.chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase());
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        let slug = slug.trim_end_matches('-');
        let slug = if slug.is_empty() { "env" } else { slug };

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", slug, &suffix[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ContainerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Pending,
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
}

impl ContainerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ContainerState::Stopped | ContainerState::Error)
    }

    /// States that hold one of the registry's concurrency slots.
    pub fn occupies_slot(self) -> bool {
        matches!(
            self,
            ContainerState::Pending | ContainerState::Starting | ContainerState::Running
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContainerState::Pending => "pending",
            ContainerState::Starting => "starting",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Stopping => "stopping",
            ContainerState::Stopped => "stopped",
            ContainerState::Error => "error",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate snapshot for one container, derived from the last poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub process_count: usize,
    pub descendant_count: usize,
    pub memory_bytes: u64,
    pub cpu_percent: f32,
    pub uptime_secs: u64,
}

impl ContainerStats {
    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// One item that could not be launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchFailure {
    pub item: String,
    pub kind: ItemKind,
    pub reason: String,
}

impl fmt::Display for LaunchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.item, self.reason)
    }
}

/// "1 of 2 items launched; Discord failed: executable not found"
pub fn summarize_launch(launched: usize, total: usize, failures: &[LaunchFailure]) -> String {
    let mut summary = format!("{} of {} items launched", launched, total);
    for failure in failures {
        summary.push_str("; ");
        summary.push_str(&failure.to_string());
    }
    summary
}
