pub mod desktop;
pub mod error;
pub mod events;
pub mod metrics;
pub mod model;
pub mod types;

pub use desktop::{DesktopError, DesktopHandle, DesktopSwitcher, NoDesktop};
pub use error::{EnvError, EnvResult};
pub use events::{EventBus, LifecycleEvent, DEFAULT_EVENT_CHANNEL_SIZE};
pub use metrics::{Metrics, MetricsSnapshot};
pub use model::{Application, ContainerOptions, Environment, ItemKind, LaunchItem, Website};
pub use types::*;
