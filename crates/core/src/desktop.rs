//! Virtual desktop capability used by containers with desktop isolation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DesktopError {
    #[error("Desktop integration unavailable: {0}")]
    Unavailable(String),
    #[error("No free desktop (all {0} in use)")]
    Exhausted(u32),
    #[error("Invalid desktop index: {0}")]
    InvalidIndex(u32),
    #[error("Desktop command failed: {0}")]
    CommandFailed(String),
}

/// Opaque handle owned by the desktop backend that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesktopHandle {
    pub index: u32,
    pub label: String,
}

#[async_trait]
pub trait DesktopSwitcher: Send + Sync {
    fn name(&self) -> &str;

    async fn allocate(&self, desired: Option<u32>) -> Result<DesktopHandle, DesktopError>;

    /// Best-effort; false when the desktop could not be foregrounded.
    async fn switch_to(&self, handle: &DesktopHandle) -> bool;

    async fn release(&self, handle: &DesktopHandle);
}

/// Backend for hosts without virtual desktop support. Declines every allocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDesktop;

#[async_trait]
impl DesktopSwitcher for NoDesktop {
    fn name(&self) -> &str {
        "none"
    }

    async fn allocate(&self, _desired: Option<u32>) -> Result<DesktopHandle, DesktopError> {
        Err(DesktopError::Unavailable(
            "no virtual desktop backend configured".to_string(),
        ))
    }

    async fn switch_to(&self, _handle: &DesktopHandle) -> bool {
        false
    }

    async fn release(&self, _handle: &DesktopHandle) {}
}
