pub mod cli;
pub mod commands;
pub mod config;

use envstarter_containers::ContainerRegistry;
use envstarter_core::EventBus;
use envstarter_desktop::select_backend;
use envstarter_supervisor::ProcessSupervisor;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// `RUST_LOG` wins unless `verbose` forces debug output.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn build_registry(config: &Config) -> ContainerRegistry {
    ContainerRegistry::new(
        ProcessSupervisor::new(config.supervisor_settings()),
        select_backend(config.desktop),
        EventBus::new(config.event_channel_size),
        config.registry_settings(),
    )
}
