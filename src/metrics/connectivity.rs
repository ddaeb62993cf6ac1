//! Union-find connectivity check for new graph structure.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::VertexId;

/// Disjoint-set forest with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`. Returns `false` if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

/// Whether the new vertices hang together with the old graph through the new edges.
///
/// With old vertices present, every new vertex must share a component with at least one
/// old vertex. Without old vertices, all new vertices must form a single component.
/// `edges` lists the vertices of each new edge.
pub fn check_connectivity<'a, I>(
    edges: I,
    old_vertices: &BTreeSet<VertexId>,
    new_vertices: &BTreeSet<VertexId>,
) -> bool
where
    I: IntoIterator<Item = &'a [VertexId]>,
{
    if new_vertices.is_empty() {
        return true;
    }
    let index: BTreeMap<VertexId, usize> = old_vertices
        .iter()
        .chain(new_vertices)
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, i))
        .collect();
    let mut sets = UnionFind::new(index.len());

    for vertices in edges {
        let mut members = vertices.iter().filter_map(|v| index.get(v).copied());
        if let Some(first) = members.next() {
            for other in members {
                sets.union(first, other);
            }
        }
    }

    let mut new_roots = new_vertices.iter().filter_map(|v| index.get(v).copied());
    if old_vertices.is_empty() {
        let Some(first) = new_roots.next() else {
            return true;
        };
        let root = sets.find(first);
        return new_roots.all(|i| sets.find(i) == root);
    }

    let old_roots: BTreeSet<usize> = old_vertices
        .iter()
        .filter_map(|v| index.get(v).copied())
        .map(|i| sets.find(i))
        .collect();
    new_roots.all(|i| old_roots.contains(&sets.find(i)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[usize]) -> BTreeSet<VertexId> {
        ids.iter().map(|&i| VertexId::pose(i)).collect()
    }

    #[test]
    fn test_union_find_basics() {
        let mut sets = UnionFind::new(5);
        assert!(sets.union(0, 1));
        assert!(sets.union(3, 4));
        assert!(!sets.union(1, 0));
        assert!(sets.connected(0, 1));
        assert!(!sets.connected(1, 3));
        sets.union(1, 4);
        assert!(sets.connected(0, 3));
        assert_eq!(sets.len(), 5);
    }

    #[test]
    fn test_no_new_vertices_is_connected() {
        let edges: Vec<Vec<VertexId>> = Vec::new();
        assert!(check_connectivity(edges.iter().map(Vec::as_slice), &set(&[0]), &set(&[])));
    }

    #[test]
    fn test_new_vertices_must_reach_old_graph() {
        let edges = [vec![VertexId::pose(0), VertexId::pose(1)], vec![VertexId::pose(2)]];

        assert!(!check_connectivity(
            edges.iter().map(Vec::as_slice),
            &set(&[0]),
            &set(&[1, 2])
        ));
        assert!(check_connectivity(
            edges[..1].iter().map(Vec::as_slice),
            &set(&[0]),
            &set(&[1])
        ));
    }

    #[test]
    fn test_empty_graph_needs_one_component() {
        let chain = [
            vec![VertexId::pose(0), VertexId::pose(1)],
            vec![VertexId::pose(1), VertexId::pose(2)],
        ];
        let split = [vec![VertexId::pose(0), VertexId::pose(1)], vec![VertexId::pose(2)]];

        assert!(check_connectivity(chain.iter().map(Vec::as_slice), &set(&[]), &set(&[0, 1, 2])));
        assert!(!check_connectivity(split.iter().map(Vec::as_slice), &set(&[]), &set(&[0, 1, 2])));
    }

    #[test]
    fn test_mixed_kinds_join_through_edges() {
        let edges = [vec![
            VertexId::pose(0),
            VertexId::velocity(0),
            VertexId::pose(1),
            VertexId::velocity(1),
            VertexId::imu_bias(0),
        ]];
        let new: BTreeSet<VertexId> = [VertexId::pose(1), VertexId::velocity(1), VertexId::imu_bias(0)]
            .into_iter()
            .collect();
        let old: BTreeSet<VertexId> = [VertexId::pose(0), VertexId::velocity(0)].into_iter().collect();

        assert!(check_connectivity(edges.iter().map(Vec::as_slice), &old, &new));
    }
}
