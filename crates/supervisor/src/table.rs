//! Process table snapshots and descendant walks.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use sysinfo::{ProcessStatus, System};
use tokio::task;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableEntry {
    pub parent: Option<u32>,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub zombie: bool,
}

/// Point-in-time copy of the OS process table.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    entries: HashMap<u32, TableEntry>,
    children: HashMap<u32, Vec<u32>>,
}

impl ProcessSnapshot {
    pub fn from_entries(entries: HashMap<u32, TableEntry>) -> Self {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (pid, entry) in &entries {
            if let Some(parent) = entry.parent {
                if parent != *pid {
                    children.entry(parent).or_default().push(*pid);
                }
            }
        }
        Self { entries, children }
    }

    /// Present and not a zombie.
    pub fn is_alive(&self, pid: u32) -> bool {
        self.entries.get(&pid).map(|e| !e.zombie).unwrap_or(false)
    }

    pub fn entry(&self, pid: u32) -> Option<&TableEntry> {
        self.entries.get(&pid)
    }

    /// Live descendants of `root`, excluding `root` itself.
    pub fn descendants(&self, root: u32) -> BTreeSet<u32> {
        let mut found = BTreeSet::new();
        let mut seen = HashSet::new();
        let mut queue = vec![root];
        seen.insert(root);

        while let Some(current) = queue.pop() {
            if let Some(kids) = self.children.get(&current) {
                for &kid in kids {
                    if !seen.insert(kid) {
                        continue;
                    }
                    if self.is_alive(kid) {
                        found.insert(kid);
                    }
                    queue.push(kid);
                }
            }
        }
        found
    }

    /// Summed CPU% and memory over `root` and the given descendants.
    pub fn usage(&self, root: u32, descendants: &BTreeSet<u32>) -> (f32, u64) {
        std::iter::once(&root)
            .chain(descendants.iter())
            .filter_map(|pid| self.entries.get(pid))
            .filter(|e| !e.zombie)
            .fold((0.0, 0), |(cpu, mem), e| (cpu + e.cpu_percent, mem + e.memory_bytes))
    }
}

/// Shared, lazily refreshed view of the OS process table.
///
/// Keeping one `System` alive between refreshes is what gives sysinfo a
/// baseline for CPU percentages.
#[derive(Clone)]
pub struct ProcessTable {
    system: Arc<Mutex<System>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    /// Refresh on the blocking pool and copy the table out.
    pub async fn snapshot(&self) -> ProcessSnapshot {
        let system = self.system.clone();
        match task::spawn_blocking(move || capture(&system)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Process table refresh task failed: {}", e);
                capture(&self.system)
            }
        }
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

fn capture(system: &Mutex<System>) -> ProcessSnapshot {
    let mut system = system.lock();
    system.refresh_processes();

    // Linux lists threads as processes too; keep only thread-group leaders
    let mut threads = HashSet::new();
    for (pid, process) in system.processes() {
        if let Some(tasks) = process.tasks() {
            threads.extend(tasks.iter().filter(|tid| *tid != pid).map(|tid| tid.as_u32()));
        }
    }

    let entries = system
        .processes()
        .iter()
        .filter(|(pid, _)| !threads.contains(&pid.as_u32()))
        .map(|(pid, process)| {
            (
                pid.as_u32(),
                TableEntry {
                    parent: process.parent().map(|p| p.as_u32()),
                    cpu_percent: process.cpu_usage(),
                    memory_bytes: process.memory(),
                    zombie: matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
                },
            )
        })
        .collect();

    ProcessSnapshot::from_entries(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(parent: Option<u32>, mem: u64) -> TableEntry {
        TableEntry {
            parent,
            cpu_percent: 1.5,
            memory_bytes: mem,
            zombie: false,
        }
    }

    fn sample_tree() -> ProcessSnapshot {
        // 1 -> 10 -> {11, 12 -> 13}; 20 unrelated; 14 zombie child of 10
        let mut entries = HashMap::new();
        entries.insert(1, entry(None, 0));
        entries.insert(10, entry(Some(1), 100));
        entries.insert(11, entry(Some(10), 10));
        entries.insert(12, entry(Some(10), 20));
        entries.insert(13, entry(Some(12), 30));
        entries.insert(20, entry(Some(1), 999));
        entries.insert(
            14,
            TableEntry {
                zombie: true,
                ..entry(Some(10), 500)
            },
        );
        ProcessSnapshot::from_entries(entries)
    }

    #[test]
    fn test_descendants_walks_whole_subtree() {
        let snap = sample_tree();
        let desc = snap.descendants(10);
        assert_eq!(desc.into_iter().collect::<Vec<_>>(), vec![11, 12, 13]);
        assert!(snap.descendants(13).is_empty());
        assert!(snap.descendants(4242).is_empty());
    }

    #[test]
    fn test_zombies_count_as_dead() {
        let snap = sample_tree();
        assert!(snap.is_alive(10));
        assert!(!snap.is_alive(14));
        assert!(!snap.is_alive(4242));
    }

    #[test]
    fn test_usage_sums_tree() {
        let snap = sample_tree();
        let desc = snap.descendants(10);
        let (cpu, mem) = snap.usage(10, &desc);
        assert_eq!(mem, 160);
        assert!((cpu - 6.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_self_parent_does_not_loop() {
        let mut entries = HashMap::new();
        entries.insert(5, entry(Some(5), 1));
        let snap = ProcessSnapshot::from_entries(entries);
        assert!(snap.descendants(5).is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_sees_current_process() {
        let table = ProcessTable::new();
        let snap = table.snapshot().await;
        assert!(snap.is_alive(std::process::id()));
    }
}
