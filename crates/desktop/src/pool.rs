use envstarter_core::DesktopError;
use parking_lot::Mutex;
use std::collections::BTreeSet;

pub const MAX_DESKTOPS: u32 = 20;

/// Tracks which desktop indices (1-based) are handed out.
#[derive(Debug)]
pub struct DesktopPool {
    max: u32,
    in_use: Mutex<BTreeSet<u32>>,
}

impl DesktopPool {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            in_use: Mutex::new(BTreeSet::new()),
        }
    }

    /// The desired index when it is free, otherwise the lowest free one.
    pub fn allocate(&self, desired: Option<u32>) -> Result<u32, DesktopError> {
        if let Some(index) = desired {
            if index == 0 || index > self.max {
                return Err(DesktopError::InvalidIndex(index));
            }
        }

        let mut in_use = self.in_use.lock();
        if let Some(index) = desired.filter(|i| !in_use.contains(i)) {
            in_use.insert(index);
            return Ok(index);
        }

        let index = (1..=self.max)
            .find(|i| !in_use.contains(i))
            .ok_or(DesktopError::Exhausted(self.max))?;
        in_use.insert(index);
        Ok(index)
    }

    pub fn release(&self, index: u32) -> bool {
        self.in_use.lock().remove(&index)
    }

    pub fn in_use(&self) -> usize {
        self.in_use.lock().len()
    }
}

impl Default for DesktopPool {
    fn default() -> Self {
        Self::new(MAX_DESKTOPS)
    }
}
