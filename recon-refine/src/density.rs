//! Density-based thinning of the point cloud.
//!
//! Local crowding is measured by power iteration on the weighted neighbor
//! graph, then a greedy sieve walks from the most crowded point down,
//! pruning points and relieving their neighbors as it goes.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use recon_data::PointCloud;
use tracing::{debug, info, warn};

use crate::config::DensityConfig;
use crate::neighbors::NeighborGraph;

/// Converged (or best-effort) density per point.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityEstimate {
    pub values: Vec<f32>,
    pub iterations: usize,
    pub converged: bool,
}

/// Power iteration on the neighbor graph, renormalized to mean 1 each step
/// and clipped at `config.ceiling`.
pub fn estimate_density(graph: &NeighborGraph, config: &DensityConfig) -> DensityEstimate {
    let count = graph.point_count();
    if graph.edge_count() == 0 {
        // nothing to propagate: every point is isolated
        return DensityEstimate {
            values: vec![0.0; count],
            iterations: 0,
            converged: true,
        };
    }

    let mut density = vec![1.0f64; count];
    let mut next = vec![0.0f64; count];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        iterations += 1;
        next.fill(0.0);
        let mut sum = 0.0f64;
        for edge in graph.edges() {
            let w = edge.weight as f64;
            next[edge.b] += w * density[edge.a];
            next[edge.a] += w * density[edge.b];
            sum += w * (density[edge.a] + density[edge.b]);
        }
        if sum <= 0.0 {
            // only zero-weight edges are left
            density.fill(0.0);
            converged = true;
            break;
        }

        let normalizer = count as f64 / sum;
        let ceiling = config.ceiling as f64;
        let mut change = 0.0;
        for (current, &raw) in density.iter_mut().zip(&next) {
            let normalized = (raw * normalizer).min(ceiling);
            change += (*current - normalized).powi(2);
            *current = normalized;
        }
        if change / (count as f64) < config.tolerance as f64 {
            converged = true;
            break;
        }
    }

    if converged {
        debug!("Density converged in {} iterations", iterations);
    } else {
        warn!(
            "Density did not converge within {} iterations, using current estimate",
            iterations
        );
    }

    DensityEstimate {
        values: density.into_iter().map(|d| d as f32).collect(),
        iterations,
        converged,
    }
}

/// Greedy sieve: returns a keep flag per point.
///
/// Points are visited by descending density (ties by index). A point whose
/// live density is still at or above `threshold` is pruned and its converged
/// density, scaled by the edge weight, is subtracted from each neighbor's
/// live density.
pub fn sieve(graph: &NeighborGraph, density: &[f32], threshold: f32) -> Vec<bool> {
    let mut order: Vec<usize> = (0..density.len()).collect();
    order.sort_by_key(|&i| Reverse(OrderedFloat(density[i])));

    let mut live = density.to_vec();
    let mut keep = vec![true; density.len()];
    for point in order {
        if live[point] < threshold {
            continue;
        }
        keep[point] = false;
        let own = density[point];
        for &(neighbor, weight) in graph.neighbors(point) {
            live[neighbor] -= own * weight;
        }
    }
    keep
}

/// Outcome of one filter call, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterReport {
    pub before: usize,
    pub after: usize,
    pub edges: usize,
    pub iterations: usize,
    pub converged: bool,
}

impl FilterReport {
    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

/// Removes over-dense points from a cloud.
#[derive(Debug, Clone, Default)]
pub struct DensityFilter {
    config: DensityConfig,
}

impl DensityFilter {
    pub fn new(config: DensityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DensityConfig {
        &self.config
    }

    /// Filter radius derived from the latest surface alpha.
    pub fn radius_for_alpha(&self, alpha: f32) -> f32 {
        alpha / self.config.alpha_divisor
    }

    /// Density of every point of `cloud` at `radius`.
    pub fn density(&self, cloud: &PointCloud, radius: f32) -> DensityEstimate {
        let graph = NeighborGraph::build(&cloud.dehomogenized(), radius);
        estimate_density(&graph, &self.config)
    }

    /// Thin `cloud` in place, keeping survivors in their original order.
    #[tracing::instrument(skip_all, fields(points = cloud.len(), radius = radius))]
    pub fn filter(&self, cloud: &mut PointCloud, radius: f32) -> FilterReport {
        let before = cloud.len();
        if cloud.is_empty() || radius.is_nan() || radius <= 0.0 {
            debug!("Density filter skipped (radius {})", radius);
            return FilterReport {
                before,
                after: before,
                edges: 0,
                iterations: 0,
                converged: true,
            };
        }

        let graph = NeighborGraph::build(&cloud.dehomogenized(), radius);
        let estimate = estimate_density(&graph, &self.config);
        let keep = sieve(&graph, &estimate.values, self.config.threshold);
        cloud.retain_flagged(&keep);

        let report = FilterReport {
            before,
            after: cloud.len(),
            edges: graph.edge_count(),
            iterations: estimate.iterations,
            converged: estimate.converged,
        };
        info!(
            "Density filter: {} -> {} points ({} neighbor pairs, {} iterations)",
            report.before, report.after, report.edges, report.iterations
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::Edge;
    use glam::Vec3;

    fn grid(side: usize) -> Vec<Vec3> {
        let mut positions = Vec::new();
        for y in 0..side {
            for x in 0..side {
                positions.push(Vec3::new(x as f32, y as f32, 0.0));
            }
        }
        positions
    }

    #[test]
    fn test_ring_density_is_uniform() {
        let count = 36;
        let radius = 1.0 / (2.0 * (std::f32::consts::PI / count as f32).sin());
        let positions: Vec<Vec3> = (0..count)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::TAU / count as f32;
                Vec3::new(angle.cos() * radius, angle.sin() * radius, 0.0)
            })
            .collect();
        let graph = NeighborGraph::build(&positions, 1.5);
        assert_eq!(graph.edge_count(), count);

        let estimate = estimate_density(&graph, &DensityConfig::default());
        assert!(estimate.converged);
        for value in &estimate.values {
            assert!((value - 1.0).abs() < 1e-3, "{value}");
        }
    }

    #[test]
    fn test_grid_density_is_symmetric() {
        let side = 7;
        let graph = NeighborGraph::build(&grid(side), 1.5);
        let estimate = estimate_density(&graph, &DensityConfig::default());
        assert!(estimate.converged);

        let at = |x: usize, y: usize| estimate.values[y * side + x];
        for y in 0..side {
            for x in 0..side {
                assert!((at(x, y) - at(side - 1 - x, y)).abs() < 1e-3);
                assert!((at(x, y) - at(x, side - 1 - y)).abs() < 1e-3);
                assert!((at(x, y) - at(y, x)).abs() < 1e-3);
            }
        }
        assert!(at(0, 0) < at(1, 1));
        assert!(at(0, 3) < at(3, 3));
        assert!(estimate.values.iter().all(|&d| d <= 2.0));
    }

    #[test]
    fn test_isolated_points_have_zero_density() {
        let positions = vec![Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)];
        let graph = NeighborGraph::build(&positions, 1.0);
        let estimate = estimate_density(&graph, &DensityConfig::default());
        assert_eq!(estimate.values, vec![0.0, 0.0]);
        assert!(estimate.converged);
    }

    #[test]
    fn test_ceiling_clips_density() {
        // a star: the hub collects far more weight than the leaves
        let edges = (1..20).map(|leaf| Edge { a: 0, b: leaf, weight: 1.0 }).collect();
        let graph = NeighborGraph::from_edges(20, edges);
        let estimate = estimate_density(&graph, &DensityConfig::default());
        assert_eq!(estimate.values[0], 2.0);
    }

    #[test]
    fn test_sieve_prunes_densest_and_relieves_neighbors() {
        let graph = NeighborGraph::from_edges(
            4,
            vec![
                Edge { a: 0, b: 1, weight: 0.5 },
                Edge { a: 1, b: 2, weight: 0.5 },
            ],
        );
        let keep = sieve(&graph, &[1.0, 1.2, 1.0, 0.1], 0.7);
        // 1 is pruned first; 0 and 2 drop to 0.4 and survive; 3 was never dense
        assert_eq!(keep, vec![true, false, true, true]);
    }

    #[test]
    fn test_sieve_ties_break_by_index() {
        let graph = NeighborGraph::from_edges(2, vec![Edge { a: 0, b: 1, weight: 1.0 }]);
        assert_eq!(sieve(&graph, &[1.0, 1.0], 0.7), vec![false, true]);
    }

    #[test]
    fn test_filter_shrinks_and_preserves_order() {
        let mut positions = grid(10);
        positions.extend((0..5).map(|i| Vec3::new(50.0 + 10.0 * i as f32, 0.0, 0.0)));
        let original = positions.clone();
        let mut cloud = PointCloud::from_positions(&positions);

        let report = DensityFilter::default().filter(&mut cloud, 1.5);
        assert!(report.after <= report.before);
        assert!(report.removed() > 0);
        assert_eq!(cloud.len(), report.after);

        // survivors form a subsequence of the input
        let survivors = cloud.dehomogenized();
        let mut cursor = original.iter();
        for s in &survivors {
            assert!(cursor.any(|p| p == s));
        }
        // isolated points are never over-dense
        for far in &original[100..] {
            assert!(survivors.contains(far));
        }
    }

    #[test]
    fn test_second_pass_keeps_sparse_points() {
        let filter = DensityFilter::default();
        let mut cloud = PointCloud::from_positions(&grid(12));
        filter.filter(&mut cloud, 1.5);

        let estimate = filter.density(&cloud, 1.5);
        let sparse: Vec<Vec3> = cloud
            .dehomogenized()
            .into_iter()
            .zip(&estimate.values)
            .filter(|(_, d)| **d < filter.config().threshold)
            .map(|(p, _)| p)
            .collect();

        let before = cloud.len();
        let report = filter.filter(&mut cloud, 1.5);
        assert!(report.after <= before);
        let survivors = cloud.dehomogenized();
        for p in &sparse {
            assert!(survivors.contains(p));
        }
    }

    #[test]
    fn test_filter_degenerate_inputs() {
        let filter = DensityFilter::default();
        let mut empty = PointCloud::default();
        assert_eq!(filter.filter(&mut empty, 1.0).after, 0);

        let mut single = PointCloud::from_positions(&[Vec3::ONE]);
        assert_eq!(filter.filter(&mut single, 1.0).after, 1);
        assert_eq!(filter.filter(&mut single, 0.0).after, 1);
        assert_eq!(filter.radius_for_alpha(2.0), 0.5);
    }
}
