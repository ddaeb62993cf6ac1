//! Removal of structurally identical candidates.

use std::collections::HashSet;

use crate::candidates::leftovers::ClustersWithLeftovers;

/// Drop entries whose signature was already seen, keeping the first occurrence.
///
/// Two entries are equal when their per-cluster item sets (continuous measurements
/// expanded to raw samples) and their leftover sets are equal.
pub fn remove_duplicates(items: Vec<ClustersWithLeftovers>) -> Vec<ClustersWithLeftovers> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.signature()))
        .collect()
}
