//! Radius-limited neighbor graph over a point cloud.

use glam::Vec3;
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use tracing::debug;

/// Linear falloff: 1 at zero distance, 0 at the radius.
pub fn falloff(distance: f32, radius: f32) -> f32 {
    1.0 - distance / radius
}

// Wrapper for RTree
struct IndexedPoint(usize, Vec3);

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.1.to_array())
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        self.1.distance_squared(Vec3::from_array(*point))
    }
}

/// One undirected edge, `a < b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub a: usize,
    pub b: usize,
    pub weight: f32,
}

/// Symmetric weighted adjacency between points closer than a radius.
///
/// Every unordered pair is stored once; [`NeighborGraph::neighbors`] walks
/// both directions so callers never deal with the storage order.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborGraph {
    edges: Vec<Edge>,
    // CSR over both directions: offsets[i]..offsets[i + 1] index `adjacency`
    offsets: Vec<usize>,
    adjacency: Vec<(usize, f32)>,
}

impl NeighborGraph {
    /// Connect every pair of points within `radius`, weighted by [`falloff`].
    ///
    /// Non-finite positions get no neighbors.
    #[tracing::instrument(skip_all, fields(points = positions.len(), radius = radius))]
    pub fn build(positions: &[Vec3], radius: f32) -> Self {
        let mut edges = Vec::new();
        if radius > 0.0 && positions.len() > 1 {
            let tree = RTree::bulk_load(
                positions
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.is_finite())
                    .map(|(i, p)| IndexedPoint(i, *p))
                    .collect(),
            );
            let radius_sq = radius * radius;
            for (i, p) in positions.iter().enumerate() {
                if !p.is_finite() {
                    continue;
                }
                let mut found: Vec<(usize, f32)> = tree
                    .locate_within_distance(p.to_array(), radius_sq)
                    .filter(|n| n.0 < i)
                    .map(|n| (n.0, n.1.distance(*p)))
                    .filter(|&(_, d)| d <= radius)
                    .collect();
                found.sort_unstable_by_key(|&(j, _)| j);
                edges.extend(found.into_iter().map(|(j, d)| Edge {
                    a: j,
                    b: i,
                    weight: falloff(d, radius),
                }));
            }
        }
        Self::from_edges(positions.len(), edges)
    }

    /// Assemble a graph from undirected edges. Self-loops are dropped and
    /// endpoints are normalized to `a < b`.
    pub fn from_edges(point_count: usize, edges: Vec<Edge>) -> Self {
        let edges: Vec<Edge> = edges
            .into_iter()
            .filter(|e| e.a != e.b)
            .map(|e| Edge {
                a: e.a.min(e.b),
                b: e.a.max(e.b),
                weight: e.weight,
            })
            .collect();

        let mut degree = vec![0usize; point_count];
        for e in &edges {
            degree[e.a] += 1;
            degree[e.b] += 1;
        }
        let mut offsets = Vec::with_capacity(point_count + 1);
        offsets.push(0);
        for d in &degree {
            offsets.push(offsets.last().copied().unwrap_or(0) + d);
        }
        let mut cursor = offsets.clone();
        let mut adjacency = vec![(0usize, 0.0f32); edges.len() * 2];
        for e in &edges {
            adjacency[cursor[e.a]] = (e.b, e.weight);
            cursor[e.a] += 1;
            adjacency[cursor[e.b]] = (e.a, e.weight);
            cursor[e.b] += 1;
        }

        debug!(
            "Neighbors total: {}, {:.3} per point",
            edges.len(),
            if point_count == 0 { 0.0 } else { edges.len() as f32 / point_count as f32 }
        );
        Self {
            edges,
            offsets,
            adjacency,
        }
    }

    pub fn point_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Each unordered pair exactly once.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Every neighbor of `point` with its edge weight, in either direction.
    pub fn neighbors(&self, point: usize) -> &[(usize, f32)] {
        &self.adjacency[self.offsets[point]..self.offsets[point + 1]]
    }
}
