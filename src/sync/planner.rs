//! Diff-and-chunk planner
//!
//! Computes whether a managed list needs updating and, if so, how to
//! partition the desired membership into bounded write batches. Planning is
//! pure set arithmetic with no I/O; a plan is computed fresh each run and
//! never persisted.

use std::collections::HashSet;
use tracing::{debug, warn};

/// An ordered sequence of write batches for one managed list
///
/// Batch order follows the arbitrary iteration order of the desired set and
/// is not reproducible across runs; the remote list is addressed by
/// membership, not by order.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    /// Batches to apply sequentially, each at most `chunk_size` members
    pub batches: Vec<Vec<String>>,
    /// Total members covered by the plan after truncation
    pub total_members: usize,
    /// Members dropped by truncation to the maximum list size
    pub dropped: usize,
}

/// Plan the update that makes `current` equal `desired`
///
/// Returns `None` when the sets are already equal: re-running a sync with
/// unchanged inputs performs zero writes. Otherwise `desired` is truncated
/// to `max_size` (which members drop is unspecified) and partitioned into
/// `ceil(n / chunk_size)` batches.
pub fn plan(
    current: &HashSet<String>,
    desired: HashSet<String>,
    max_size: usize,
    chunk_size: usize,
) -> Option<SyncPlan> {
    if *current == desired {
        debug!(members = current.len(), "List already in sync");
        return None;
    }

    let original_len = desired.len();
    let dropped = original_len.saturating_sub(max_size);
    if dropped > 0 {
        warn!(
            desired = original_len,
            max_size = max_size,
            dropped = dropped,
            "Desired set exceeds maximum list size, truncating"
        );
    }

    let members: Vec<String> = desired.into_iter().take(max_size).collect();
    let total_members = members.len();

    let chunk_size = chunk_size.max(1);
    let batches: Vec<Vec<String>> = members
        .chunks(chunk_size)
        .map(|chunk| chunk.to_vec())
        .collect();

    Some(SyncPlan {
        batches,
        total_members,
        dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // Test 1: Equal sets yield no plan, regardless of construction order
    #[test]
    fn test_idempotence_on_equal_sets() {
        let current = set(&["1.1.1.1", "2.2.2.2", "3.3.3.3"]);
        let desired = set(&["3.3.3.3", "1.1.1.1", "2.2.2.2"]);

        assert_eq!(plan(&current, desired, 10_000, 1_000), None);
    }

    // Test 2: Unequal sets yield a plan
    #[test]
    fn test_unequal_sets_yield_plan() {
        let current = set(&["1.1.1.1", "2.2.2.2"]);
        let desired = set(&["2.2.2.2", "3.3.3.3"]);

        let plan = plan(&current, desired.clone(), 10_000, 1_000).unwrap();
        assert_eq!(plan.batches.len(), 1);
        assert_eq!(plan.total_members, 2);
        assert_eq!(plan.dropped, 0);

        let union: HashSet<String> = plan.batches.into_iter().flatten().collect();
        assert_eq!(union, desired);
    }

    // Test 3: Desired set over the cap is truncated to exactly max_size
    #[test]
    fn test_truncation_at_max_size() {
        let current = HashSet::new();
        let desired: HashSet<String> = (0..10_001).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();
        assert_eq!(desired.len(), 10_001);

        let plan = plan(&current, desired, 10_000, 1_000).unwrap();
        assert_eq!(plan.total_members, 10_000);
        assert_eq!(plan.dropped, 1);

        let covered: usize = plan.batches.iter().map(|b| b.len()).sum();
        assert_eq!(covered, 10_000);
    }

    // Test 4: Chunk count is ceil(N/C), every chunk within bound, union preserved
    #[test]
    fn test_chunking_properties() {
        let current = HashSet::new();
        let desired: HashSet<String> = (0..2_501).map(|i| format!("192.0.{}.{}", i / 256, i % 256)).collect();

        let plan = plan(&current, desired.clone(), 10_000, 500).unwrap();

        // ceil(2501 / 500) = 6
        assert_eq!(plan.batches.len(), 6);
        assert!(plan.batches.iter().all(|b| b.len() <= 500));

        let union: HashSet<String> = plan.batches.into_iter().flatten().collect();
        assert_eq!(union, desired);
    }

    // Test 5: Truncation below current cardinality still plans correctly
    #[test]
    fn test_truncation_and_chunking_combined() {
        let current = set(&["1.1.1.1"]);
        let desired: HashSet<String> = (0..25).map(|i| format!("10.0.0.{}", i)).collect();

        let plan = plan(&current, desired.clone(), 10, 4).unwrap();
        assert_eq!(plan.total_members, 10);
        assert_eq!(plan.dropped, 15);
        // ceil(10 / 4) = 3
        assert_eq!(plan.batches.len(), 3);

        let union: HashSet<String> = plan.batches.iter().flatten().cloned().collect();
        assert_eq!(union.len(), 10);
        assert!(union.is_subset(&desired));
    }

    // Test 6: Empty desired against a populated list yields an empty plan
    #[test]
    fn test_empty_desired_set() {
        let current = set(&["1.1.1.1"]);

        let plan = plan(&current, HashSet::new(), 10_000, 1_000).unwrap();
        assert!(plan.batches.is_empty());
        assert_eq!(plan.total_members, 0);
    }

    // Test 7: Both sets empty is a no-op
    #[test]
    fn test_both_empty_is_noop() {
        assert_eq!(plan(&HashSet::new(), HashSet::new(), 10_000, 1_000), None);
    }

    // Test 8: Chunk size of zero is clamped rather than panicking
    #[test]
    fn test_zero_chunk_size_clamped() {
        let current = HashSet::new();
        let desired = set(&["1.1.1.1", "2.2.2.2"]);

        let plan = plan(&current, desired, 10_000, 0).unwrap();
        assert_eq!(plan.batches.len(), 2);
    }
}
