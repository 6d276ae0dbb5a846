//! Desktop backends for container isolation.

pub mod hyprland;
pub mod pool;

use envstarter_core::{DesktopSwitcher, NoDesktop};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub use hyprland::HyprlandDesktop;
pub use pool::{DesktopPool, MAX_DESKTOPS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesktopKind {
    #[default]
    None,
    Hyprland,
    /// Hyprland when a session is detected, otherwise none.
    Auto,
}

pub fn select_backend(kind: DesktopKind) -> Arc<dyn DesktopSwitcher> {
    match kind {
        DesktopKind::None => Arc::new(NoDesktop),
        DesktopKind::Hyprland => {
            if !HyprlandDesktop::is_available() {
                warn!("Hyprland desktop requested but no Hyprland session was detected");
            }
            Arc::new(HyprlandDesktop::new())
        }
        DesktopKind::Auto => {
            if HyprlandDesktop::is_available() {
                debug!("Detected Hyprland session");
                Arc::new(HyprlandDesktop::new())
            } else {
                Arc::new(NoDesktop)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_backend_names() {
        assert_eq!(select_backend(DesktopKind::None).name(), "none");
        assert_eq!(select_backend(DesktopKind::Hyprland).name(), "hyprland");
    }

    #[test]
    fn test_kind_deserializes_lowercase() {
        let kind: DesktopKind = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(kind, DesktopKind::Auto);
    }
}
