//! Containers (one running environment each) and the registry that owns them.

pub mod container;
pub mod ledger;
pub mod registry;
pub mod report;

pub use container::{Container, ContainerContext, ContainerSettings};
pub use ledger::PidLedger;
pub use registry::{ContainerRegistry, RegistrySettings, DEFAULT_MAX_CONTAINERS};
pub use report::{
    ContainerSummary, LaunchedItem, ResumeReport, StartReport, StopReport, SystemStatus,
};
