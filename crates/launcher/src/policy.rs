use std::fmt;
use std::time::Duration;

/// How a queue of environment launches is scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaunchPolicy {
    /// Everything at once.
    #[default]
    Concurrent,
    /// One after another, each waiting for the previous.
    Sequential,
    /// Groups of `size` at a time.
    Batched { size: usize },
    /// Everything concurrently, the i-th start delayed by `i * delay`.
    Staggered { delay: Duration },
}

impl LaunchPolicy {
    /// Delay before the request at `position` within its group starts.
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn start_offset(&self, position: usize) -> Duration {
        match self {
            LaunchPolicy::Staggered { delay } => u32::try_from(position)
                .ok()
                .and_then(|position| delay.checked_mul(position))
                .unwrap_or(Duration::MAX),
            _ => Duration::ZERO,
        }
    }

    /// Only batched groups are separated by the coordinator's batch pause.
    pub fn pauses_between_groups(&self) -> bool {
        matches!(self, LaunchPolicy::Batched { .. })
    }
}

impl fmt::Display for LaunchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchPolicy::Concurrent => write!(f, "concurrent"),
            LaunchPolicy::Sequential => write!(f, "sequential"),
            LaunchPolicy::Batched { size } => write!(f, "batched (size {})", size),
            LaunchPolicy::Staggered { delay } => write!(f, "staggered ({:?} apart)", delay),
        }
    }
}

/// Partition request indices `0..n` into the groups that run together.
///
/// Groups run one after another; members of a group run concurrently.
pub fn plan(policy: &LaunchPolicy, n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return Vec::new();
    }
    match policy {
        LaunchPolicy::Concurrent | LaunchPolicy::Staggered { .. } => vec![(0..n).collect()],
        LaunchPolicy::Sequential => (0..n).map(|i| vec![i]).collect(),
        LaunchPolicy::Batched { size } => {
            let size = (*size).max(1);
            (0..n)
                .collect::<Vec<_>>()
                .chunks(size)
                .map(<[usize]>::to_vec)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_batched_five_by_two() {
        assert_eq!(
            plan(&LaunchPolicy::Batched { size: 2 }, 5),
            vec![vec![0, 1], vec![2, 3], vec![4]]
        );
    }

    #[test]
    fn test_other_policies() {
        assert_eq!(plan(&LaunchPolicy::Concurrent, 3), vec![vec![0, 1, 2]]);
        assert_eq!(
            plan(&LaunchPolicy::Sequential, 3),
            vec![vec![0], vec![1], vec![2]]
        );
        assert_eq!(
            plan(
                &LaunchPolicy::Staggered {
                    delay: Duration::from_secs(1)
                },
                2
            ),
            vec![vec![0, 1]]
        );
        assert!(plan(&LaunchPolicy::Sequential, 0).is_empty());
        assert_eq!(
            plan(&LaunchPolicy::Batched { size: 0 }, 2),
            vec![vec![0], vec![1]]
        );
    }

    #[test]
    fn test_start_offset_saturates() {
        let staggered = LaunchPolicy::Staggered {
            delay: Duration::from_millis(100),
        };
        assert_eq!(staggered.start_offset(0), Duration::ZERO);
        assert_eq!(staggered.start_offset(3), Duration::from_millis(300));

        let huge = LaunchPolicy::Staggered {
            delay: Duration::MAX,
        };
        assert_eq!(huge.start_offset(0), Duration::ZERO);
        assert_eq!(huge.start_offset(2), Duration::MAX);
        assert_eq!(staggered.start_offset(usize::MAX), Duration::MAX);

        assert_eq!(LaunchPolicy::Concurrent.start_offset(5), Duration::ZERO);
        assert_eq!(
            LaunchPolicy::Batched { size: 2 }.start_offset(1),
            Duration::ZERO
        );
    }

    #[test]
    fn test_only_batched_pauses_between_groups() {
        assert!(LaunchPolicy::Batched { size: 2 }.pauses_between_groups());
        assert!(!LaunchPolicy::Sequential.pauses_between_groups());
        assert!(!LaunchPolicy::Concurrent.pauses_between_groups());
        assert!(!LaunchPolicy::Staggered {
            delay: Duration::from_secs(1)
        }
        .pauses_between_groups());
    }

    proptest! {
        #[test]
        fn prop_batched_partition_covers_every_index_once(n in 0usize..200, size in 1usize..20) {
            let groups = plan(&LaunchPolicy::Batched { size }, n);
            let flat: Vec<usize> = groups.iter().flatten().copied().collect();
            prop_assert_eq!(flat, (0..n).collect::<Vec<_>>());
            prop_assert_eq!(groups.len(), (n + size - 1) / size);
            prop_assert!(groups.iter().all(|g| !g.is_empty() && g.len() <= size));
            if let Some((last, full)) = groups.split_last() {
                prop_assert!(full.iter().all(|g| g.len() == size));
                prop_assert!(last.len() <= size);
            }
        }
    }
}
