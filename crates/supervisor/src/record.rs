use chrono::{DateTime, Utc};
use envstarter_core::{Application, ContainerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// What to run for one launch.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub label: String,
    pub command: String,
    pub arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub wait_for_exit: bool,
}

impl LaunchSpec {
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            arguments: Vec::new(),
            working_directory: None,
            wait_for_exit: false,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = args.into_iter().map(Into::into).collect();
        self
    }
}

impl From<&Application> for LaunchSpec {
    fn from(app: &Application) -> Self {
        Self {
            label: app.name.clone(),
            command: app.path.clone(),
            arguments: app.argv(),
            working_directory: app.working_directory.clone(),
            wait_for_exit: app.wait_for_exit,
        }
    }
}

/// One supervised process and what was last observed about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub container_id: ContainerId,
    /// `None` for website launches.
    pub application: Option<Application>,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub alive: bool,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub descendants: BTreeSet<u32>,
}

impl ProcessRecord {
    pub fn new(pid: u32, container_id: ContainerId, label: impl Into<String>) -> Self {
        Self {
            pid,
            container_id,
            application: None,
            label: label.into(),
            started_at: Utc::now(),
            alive: true,
            cpu_percent: 0.0,
            memory_bytes: 0,
            descendants: BTreeSet::new(),
        }
    }

    pub fn apply(&mut self, sample: &ProcessSample) {
        self.alive = sample.alive;
        self.cpu_percent = sample.cpu_percent;
        self.memory_bytes = sample.memory_bytes;
        self.descendants = sample.descendants.clone();
    }

    /// Root first, then known descendants.
    pub fn pids(&self) -> impl Iterator<Item = u32> + '_ {
        std::iter::once(self.pid).chain(self.descendants.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProcessSample {
    pub pid: u32,
    pub alive: bool,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub descendants: BTreeSet<u32>,
}

impl ProcessSample {
    pub fn dead(pid: u32) -> Self {
        Self {
            pid,
            ..Self::default()
        }
    }
}
