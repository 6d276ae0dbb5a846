//! Hyprland workspaces as container desktops.

use async_trait::async_trait;
use envstarter_core::{DesktopError, DesktopHandle, DesktopSwitcher};
use tokio::process::Command;
use tracing::{info, warn};

use crate::pool::DesktopPool;

pub struct HyprlandDesktop {
    pool: DesktopPool,
    hyprctl: String,
}

impl HyprlandDesktop {
    pub fn new() -> Self {
        Self::with_command("hyprctl")
    }

    /// Use a different `hyprctl` binary.
    pub fn with_command(hyprctl: impl Into<String>) -> Self {
        Self {
            pool: DesktopPool::default(),
            hyprctl: hyprctl.into(),
        }
    }

    /// Running inside a Hyprland session with `hyprctl` on PATH.
    pub fn is_available() -> bool {
        std::env::var_os("HYPRLAND_INSTANCE_SIGNATURE").is_some()
            && which::which("hyprctl").is_ok()
    }

    pub fn in_use(&self) -> usize {
        self.pool.in_use()
    }

    async fn dispatch_workspace(&self, index: u32) -> Result<(), DesktopError> {
        if index == 0 {
            return Err(DesktopError::InvalidIndex(index));
        }
        let output = Command::new(&self.hyprctl)
            .args(["dispatch", "workspace", &index.to_string()])
            .output()
            .await
            .map_err(|e| DesktopError::CommandFailed(format!("{}: {}", self.hyprctl, e)))?;

        if !output.status.success() {
            return Err(DesktopError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for HyprlandDesktop {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DesktopSwitcher for HyprlandDesktop {
    fn name(&self) -> &str {
        "hyprland"
    }

    async fn allocate(&self, desired: Option<u32>) -> Result<DesktopHandle, DesktopError> {
        let index = self.pool.allocate(desired)?;
        info!("Allocated Hyprland workspace {}", index);
        Ok(DesktopHandle {
            index,
            label: format!("workspace {}", index),
        })
    }

    async fn switch_to(&self, handle: &DesktopHandle) -> bool {
        match self.dispatch_workspace(handle.index).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to switch to {}: {}", handle.label, e);
                false
            }
        }
    }

    async fn release(&self, handle: &DesktopHandle) {
        if self.pool.release(handle.index) {
            info!("Released Hyprland workspace {}", handle.index);
        }
    }
}
