//! Delaunay face generation for point clouds.
//!
//! A stand-in surface for refinement passes: points are projected onto the
//! plane with the largest spread and triangulated in 2D with `delaunator`.

use delaunator::{Point, triangulate};
use glam::Vec3;
use tracing::{debug, warn};

use crate::types::Face;

/// Plane used to flatten a cloud before 2D triangulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionPlane {
    XY,
    XZ,
    YZ,
}

impl ProjectionPlane {
    /// The axis the plane drops; face normals are turned to face along it.
    pub fn axis(self) -> Vec3 {
        match self {
            ProjectionPlane::XY => Vec3::Z,
            ProjectionPlane::XZ => Vec3::Y,
            ProjectionPlane::YZ => Vec3::X,
        }
    }

    fn project(self, p: Vec3) -> Point {
        let (x, y) = match self {
            ProjectionPlane::XY => (p.x, p.y),
            ProjectionPlane::XZ => (p.x, p.z),
            ProjectionPlane::YZ => (p.y, p.z),
        };
        Point {
            x: x as f64,
            y: y as f64,
        }
    }
}

/// Pick the plane that drops the axis with the smallest extent.
pub fn best_projection_plane(positions: &[Vec3]) -> ProjectionPlane {
    if positions.is_empty() {
        return ProjectionPlane::XY;
    }

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for pos in positions {
        min = min.min(*pos);
        max = max.max(*pos);
    }
    let extent = max - min;

    if extent.z <= extent.x && extent.z <= extent.y {
        ProjectionPlane::XY
    } else if extent.y <= extent.x && extent.y <= extent.z {
        ProjectionPlane::XZ
    } else {
        ProjectionPlane::YZ
    }
}

/// Triangulate a cloud on its best projection plane.
///
/// Non-finite positions are left out of the triangulation. Faces are wound
/// so that `(b - a) x (c - b)` points along the dropped axis.
pub fn delaunay_faces(positions: &[Vec3]) -> Vec<Face> {
    let usable: Vec<usize> = (0..positions.len())
        .filter(|&i| positions[i].is_finite())
        .collect();
    if usable.len() < 3 {
        warn!("Not enough points for triangulation (need at least 3)");
        return Vec::new();
    }

    let kept: Vec<Vec3> = usable.iter().map(|&i| positions[i]).collect();
    let plane = best_projection_plane(&kept);
    let points: Vec<Point> = kept.iter().map(|p| plane.project(*p)).collect();
    let result = triangulate(&points);

    let faces: Vec<Face> = result
        .triangles
        .chunks_exact(3)
        .map(|chunk| {
            let [a, b, c] = [usable[chunk[0]], usable[chunk[1]], usable[chunk[2]]];
            let normal = (positions[b] - positions[a]).cross(positions[c] - positions[b]);
            if normal.dot(plane.axis()) < 0.0 { [a, c, b] } else { [a, b, c] }
        })
        .collect();

    debug!(
        "Triangulated {} points into {} faces (plane: {:?})",
        positions.len(),
        faces.len(),
        plane
    );
    faces
}

/// Mean edge length over all faces, 0 for an empty face list.
pub fn mean_edge_length(positions: &[Vec3], faces: &[Face]) -> f32 {
    if faces.is_empty() {
        return 0.0;
    }
    let total: f32 = faces
        .iter()
        .map(|&[a, b, c]| {
            positions[a].distance(positions[b])
                + positions[b].distance(positions[c])
                + positions[c].distance(positions[a])
        })
        .sum();
    total / (faces.len() * 3) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delaunay_square() {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let faces = delaunay_faces(&positions);
        assert_eq!(faces.len(), 2);
        for face in &faces {
            for &idx in face {
                assert!(idx < positions.len());
            }
        }
    }

    #[test]
    fn test_delaunay_faces_wind_along_axis() {
        let flat_y = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(3.0, 0.1, 0.0),
            Vec3::new(3.0, 0.0, 3.0),
            Vec3::new(0.0, 0.2, 3.0),
            Vec3::new(1.5, 0.0, 1.0),
        ];
        let faces = delaunay_faces(&flat_y);
        assert!(!faces.is_empty());
        for [a, b, c] in faces {
            let normal = (flat_y[b] - flat_y[a]).cross(flat_y[c] - flat_y[b]);
            assert!(normal.y > 0.0);
        }
    }

    #[test]
    fn test_delaunay_skips_non_finite() {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(f32::NAN, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let faces = delaunay_faces(&positions);
        assert_eq!(faces.len(), 1);
        assert!(!faces[0].contains(&1));
    }

    #[test]
    fn test_delaunay_insufficient_points() {
        assert!(delaunay_faces(&[Vec3::ZERO, Vec3::X]).is_empty());
        assert!(delaunay_faces(&[]).is_empty());
    }

    #[test]
    fn test_best_projection_plane() {
        let flat_y = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(5.0, 1.0, 5.0),
        ];
        assert_eq!(best_projection_plane(&flat_y), ProjectionPlane::XZ);
        assert_eq!(best_projection_plane(&[]), ProjectionPlane::XY);
    }

    #[test]
    fn test_mean_edge_length() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let faces = vec![[0, 1, 2]];
        let expected = (2.0 + 2f32.sqrt()) / 3.0;
        assert!((mean_edge_length(&positions, &faces) - expected).abs() < 1e-6);
        assert_eq!(mean_edge_length(&positions, &[]), 0.0);
    }
}
