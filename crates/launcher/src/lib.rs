pub mod coordinator;
pub mod policy;

pub use coordinator::{
    ConcurrentLaunchCoordinator, EnvironmentLauncher, LaunchOutcome, LaunchRequest,
};
pub use policy::{plan, LaunchPolicy};
