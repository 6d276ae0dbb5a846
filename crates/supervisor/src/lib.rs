//! Process supervision: resolve, spawn, sample, signal.

pub mod error;
pub mod record;
pub mod resolve;
pub mod signals;
pub mod supervisor;
pub mod table;

pub use error::{SupervisorError, SupervisorResult};
pub use record::{LaunchSpec, ProcessRecord, ProcessSample};
pub use resolve::{expand_placeholders, resolve_executable};
pub use supervisor::{ProcessSupervisor, SupervisorSettings};
pub use table::{ProcessSnapshot, ProcessTable};
