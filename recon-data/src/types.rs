//! Core geometry types: homogeneous point clouds and triangle meshes.
//!
//! Points are kept homogeneous (`Vec4`) the whole way through refinement so
//! that bundles at infinity survive until something actually needs Euclidean
//! coordinates.

use glam::{Vec3, Vec4};

/// Drop the homogeneous coordinate of a point.
///
/// Points at infinity (`w == 0`) keep their direction unchanged.
pub fn dehomogenize(point: Vec4) -> Vec3 {
    if point.w == 0.0 {
        point.truncate()
    } else {
        point.truncate() / point.w
    }
}

/// An ordered cloud of homogeneous points in world space.
///
/// Index identity matters between passes, so every operation that removes
/// points keeps the relative order of the survivors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Vec4>,
}

impl PointCloud {
    pub fn new(points: Vec<Vec4>) -> Self {
        Self { points }
    }

    /// Build a cloud from Euclidean positions (`w = 1`).
    pub fn from_positions(positions: &[Vec3]) -> Self {
        Self {
            points: positions.iter().map(|p| p.extend(1.0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Euclidean positions of every point, in order.
    pub fn dehomogenized(&self) -> Vec<Vec3> {
        self.points.iter().map(|p| dehomogenize(*p)).collect()
    }

    /// Append newly triangulated points at the end of the cloud.
    pub fn append(&mut self, points: impl IntoIterator<Item = Vec4>) {
        self.points.extend(points);
    }

    /// Keep the points whose flag is set, preserving their relative order.
    ///
    /// Returns the number of removed points.
    pub fn retain_flagged(&mut self, keep: &[bool]) -> usize {
        debug_assert_eq!(keep.len(), self.points.len());
        let before = self.points.len();
        let mut write = 0;
        for read in 0..before {
            if keep[read] {
                if read > write {
                    self.points[write] = self.points[read];
                }
                write += 1;
            }
        }
        self.points.truncate(write);
        before - write
    }
}

/// A triangle face as three vertex indices.
pub type Face = [usize; 3];

/// A triangle mesh over dehomogenized vertex positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<Face>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vec3>, faces: Vec<Face>) -> Self {
        Self { vertices, faces }
    }

    /// Build a mesh from a homogeneous cloud and face indices into it.
    pub fn from_cloud(cloud: &PointCloud, faces: Vec<Face>) -> Self {
        Self {
            vertices: cloud.dehomogenized(),
            faces,
        }
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// The three corner positions of a face.
    pub fn corners(&self, face: usize) -> [Vec3; 3] {
        let [a, b, c] = self.faces[face];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    /// Un-normalized normal, `(b - a) x (c - b)`.
    pub fn face_normal(&self, face: usize) -> Vec3 {
        let [a, b, c] = self.corners(face);
        (b - a).cross(c - b)
    }

    pub fn unit_normal(&self, face: usize) -> Vec3 {
        self.face_normal(face).normalize_or_zero()
    }

    pub fn face_area(&self, face: usize) -> f32 {
        self.face_normal(face).length() * 0.5
    }

    pub fn face_centroid(&self, face: usize) -> Vec3 {
        let [a, b, c] = self.corners(face);
        (a + b + c) / 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dehomogenize() {
        assert_eq!(dehomogenize(Vec4::new(2.0, 4.0, 6.0, 2.0)), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(dehomogenize(Vec4::new(1.0, 0.0, 0.0, 0.0)), Vec3::X);
    }

    #[test]
    fn test_retain_flagged_preserves_order() {
        let mut cloud = PointCloud::from_positions(&[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
        ]);
        let removed = cloud.retain_flagged(&[false, true, false, true]);
        assert_eq!(removed, 2);
        assert_eq!(cloud.dehomogenized(), vec![Vec3::X, Vec3::new(3.0, 0.0, 0.0)]);
    }

    #[test]
    fn test_face_geometry() {
        let mesh = Mesh::new(
            vec![Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), Vec3::new(0.0, 3.0, 0.0)],
            vec![[0, 1, 2]],
        );
        assert_eq!(mesh.face_centroid(0), Vec3::new(1.0, 1.0, 0.0));
        assert!((mesh.face_area(0) - 4.5).abs() < 1e-6);
        assert!((mesh.unit_normal(0) - Vec3::Z).length() < 1e-6);
    }
}
