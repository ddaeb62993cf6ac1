//! Loop filter: rejects combinations placing both halves of one odometry measurement
//! in the same cluster, which would force an edge from a vertex to itself.

use std::collections::HashSet;

use crate::candidates::combinations::Combination;
use crate::measurement::{Measurement, MeasurementCluster};

/// Whether the cluster holds both halves of some split odometry.
pub fn has_loop(cluster: &MeasurementCluster) -> bool {
    let mut parents = HashSet::new();
    cluster.core().iter().any(|measurement| match measurement {
        Measurement::SplitOdometry(split) => !parents.insert(split.parent().id),
        _ => false,
    })
}

/// Keep the combinations without a looping cluster, in their original order.
pub fn remove_loops(combinations: Vec<Combination>) -> Vec<Combination> {
    combinations
        .into_iter()
        .filter(|combination| !combination.iter().any(has_loop))
        .collect()
}
