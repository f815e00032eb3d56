//! Virtual viewpoints standing on mesh faces, plus the projection helpers the
//! visibility test shares with them.
//!
//! Every matrix here follows the clip-space convention of the scene cameras:
//! a point is in front of a camera when its clip `w` is positive, and NDC
//! spans `[-1, 1]` on all three axes.

use glam::{Mat4, Vec3, Vec4};
use recon_data::{Mesh, dehomogenize};

use crate::config::SelectorConfig;

/// Clip-space image of every camera's optical center.
const CENTER_IMAGE: Vec4 = Vec4::new(0.0, 0.0, -1.0, 0.0);

/// Optical center of a projection matrix, `P^-1 (0, 0, -1, 0)`.
///
/// `None` for matrices that cannot be inverted.
pub fn camera_center(camera: Mat4) -> Option<Vec3> {
    let det = camera.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let center = dehomogenize(camera.inverse() * CENTER_IMAGE);
    center.is_finite().then_some(center)
}

/// NDC of `point` seen through `camera`, or `None` behind the camera.
pub fn project(camera: Mat4, point: Vec3) -> Option<Vec3> {
    let clip = camera * point.extend(1.0);
    if clip.w <= 0.0 {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    ndc.is_finite().then_some(ndc)
}

pub fn in_unit_cube(ndc: Vec3) -> bool {
    ndc.abs().cmple(Vec3::ONE).all()
}

/// Rigid transform placing `center` at the origin and `normal` on +z.
///
/// `normal` must be unit length.
pub fn face_rotation(center: Vec3, normal: Vec3) -> Mat4 {
    let Vec3 { x, y, z } = normal;
    let xy_sq = x * x + y * y;
    let rotation = if xy_sq > 0.0 {
        let xy = xy_sq.sqrt();
        // rows: (side x normal, side, normal) with side = z x normal
        Mat4::from_cols_array_2d(&[
            [x * z / xy, y * z / xy, -xy, 0.0],
            [-y / xy, x / xy, 0.0, 0.0],
            [x, y, z, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
        .transpose()
    } else {
        let s = if z > 0.0 { 1.0 } else { -1.0 };
        Mat4::from_diagonal(Vec4::new(1.0, s, s, 1.0))
    };
    rotation * Mat4::from_translation(-center)
}

/// Perspective projection looking down +z with a square image.
pub fn viewer_projection(focal: f32, near: f32, far: f32) -> Mat4 {
    Mat4::from_cols_array_2d(&[
        [focal, 0.0, 0.0, 0.0],
        [0.0, focal, 0.0, 0.0],
        [0.0, 0.0, (near + far) / (far - near), 2.0 * near * far / (near - far)],
        [0.0, 0.0, 1.0, 0.0],
    ])
    .transpose()
}

/// A camera synthesized on a mesh face, looking out along its normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceViewer {
    pub face: usize,
    pub center: Vec3,
    pub normal: Vec3,
    pub matrix: Mat4,
}

impl FaceViewer {
    /// Viewer for `face`, or `None` when the face is degenerate.
    pub fn new(mesh: &Mesh, face: usize, config: &SelectorConfig) -> Option<Self> {
        let normal = mesh.unit_normal(face);
        if normal == Vec3::ZERO || !normal.is_finite() {
            return None;
        }
        let center = mesh.face_centroid(face);
        let projection = viewer_projection(config.viewer_focal, config.viewer_near, config.viewer_far);
        Some(Self {
            face,
            center,
            normal,
            matrix: projection * face_rotation(center, normal),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!(a.distance(b) < 1e-4, "{a} != {b}");
    }

    #[test]
    fn test_rotation_maps_face_frame() {
        let normals = [
            Vec3::new(1.0, 2.0, 3.0).normalize(),
            Vec3::new(-0.3, 0.1, -0.9).normalize(),
            Vec3::X,
            Vec3::Z,
            Vec3::NEG_Z,
        ];
        let center = Vec3::new(0.5, -2.0, 4.0);
        for normal in normals {
            let transform = face_rotation(center, normal);
            assert_close(transform.transform_point3(center), Vec3::ZERO);
            assert_close(transform.transform_vector3(normal), Vec3::Z);
            assert!((transform.determinant() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_viewer_projection_depth_range() {
        let projection = viewer_projection(0.25, 0.5, 10.0);
        let near = project(projection, Vec3::new(0.0, 0.0, 0.5)).unwrap();
        let far = project(projection, Vec3::new(0.0, 0.0, 10.0)).unwrap();
        assert!((near.z + 1.0).abs() < 1e-5);
        assert!((far.z - 1.0).abs() < 1e-5);

        let side = project(projection, Vec3::new(4.0, -2.0, 4.0)).unwrap();
        assert_close(side, Vec3::new(0.25, -0.125, side.z));
        assert!(project(projection, Vec3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn test_camera_center_of_look_at() {
        let eye = Vec3::new(3.0, 1.0, -2.0);
        let camera = Mat4::perspective_rh_gl(1.0, 1.5, 0.1, 50.0) * Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        assert_close(camera_center(camera).unwrap(), eye);

        let viewer_center = Vec3::new(1.0, 1.0, 1.0);
        let viewer = viewer_projection(0.25, 0.001, 10.0) * face_rotation(viewer_center, Vec3::Y);
        assert_close(camera_center(viewer).unwrap(), viewer_center);

        assert!(camera_center(Mat4::ZERO).is_none());
    }

    #[test]
    fn test_face_viewer_looks_along_normal() {
        let mesh = Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![[0, 1, 2]],
        );
        let viewer = FaceViewer::new(&mesh, 0, &SelectorConfig::default()).unwrap();
        assert_close(viewer.normal, Vec3::Z);

        let above = viewer.center + Vec3::Z;
        let ndc = project(viewer.matrix, above).unwrap();
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(in_unit_cube(ndc));
        assert!(project(viewer.matrix, viewer.center - Vec3::Z).is_none());

        let flat = Mesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::X * 2.0], vec![[0, 1, 2]]);
        assert!(FaceViewer::new(&flat, 0, &SelectorConfig::default()).is_none());
    }
}
