use thiserror::Error;

use crate::types::{ContainerId, ContainerState, LaunchFailure};

fn join_failures(failures: &[LaunchFailure]) -> String {
    if failures.is_empty() {
        return "no items to launch".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_pids(pids: &[u32]) -> String {
    pids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Error)]
pub enum EnvError {
    #[error("Container not found: {0}")]
    NotFound(ContainerId),

    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    #[error("Capacity exceeded: at most {max} containers may be active")]
    CapacityExceeded { max: usize },

    #[error("Container id already in use: {0}")]
    DuplicateId(ContainerId),

    #[error("Failed to launch {item}: {reason}")]
    LaunchFailure { item: String, reason: String },

    #[error("Cannot {operation} container {id} while {state}")]
    InvalidTransition {
        id: ContainerId,
        operation: &'static str,
        state: ContainerState,
    },

    #[error("Container {id} stopped with unconfirmed processes: {}", join_pids(.pids))]
    TerminationTimeout { id: ContainerId, pids: Vec<u32> },

    #[error("Container {id} failed to start: {}", join_failures(.failures))]
    StartFailed {
        id: ContainerId,
        failures: Vec<LaunchFailure>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EnvResult<T> = Result<T, EnvError>;
