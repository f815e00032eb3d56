//! Interfaces of the collaborators a refinement pass drives.
//!
//! The engine never rasterizes, matches or triangulates itself; it asks
//! these traits. Stock implementations live next to them when they are cheap
//! ([`DelaunaySurface`], [`PassBudget`]).

use glam::{Mat4, Vec4};
use image::Rgb32FImage;
use recon_data::{DepthBuffer, Face, FlowField, Mesh, PointCloud, delaunay_faces, mean_edge_length};

use crate::error::RefineError;

/// Rasterizer answering depth queries against the currently loaded mesh.
pub trait Renderer {
    /// Replace the mesh all later queries are answered against.
    fn load_mesh(&mut self, mesh: &Mesh) -> Result<(), RefineError>;

    /// Depth buffer of the loaded mesh as seen through `camera`.
    fn depth(&mut self, camera: Mat4) -> Result<DepthBuffer, RefineError>;

    /// Warp `source`, taken by `source_camera`, into the view of `target_camera`.
    fn projected(
        &mut self,
        target_camera: Mat4,
        source: &Rgb32FImage,
        source_camera: Mat4,
    ) -> Result<Rgb32FImage, RefineError>;
}

/// Faces generated over a point cloud, with the shape parameter used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Surface {
    pub faces: Vec<Face>,
    /// Length scale the surface was built at; drives the density radius.
    pub alpha: f32,
}

/// Turns a point cloud into triangle faces ("alpha shape").
pub trait SurfaceBuilder {
    fn build(&mut self, points: &PointCloud) -> Result<Surface, RefineError>;
}

/// Dense optical flow from `reference` to `moved`.
pub trait FlowEstimator {
    fn flow(&mut self, reference: &Rgb32FImage, moved: &Rgb32FImage) -> Result<FlowField, RefineError>;
}

/// Triangulates new points from flow fields between a main and side cameras.
pub trait Triangulator {
    fn triangulate(
        &mut self,
        flows: &[FlowField],
        main_camera: Mat4,
        side_cameras: &[Mat4],
        depth: &DepthBuffer,
    ) -> Result<Vec<Vec4>, RefineError>;
}

/// Decides whether another refinement pass should run.
pub trait ConvergenceCriterion {
    fn keep_refining(&mut self, points: &PointCloud) -> bool;
}

/// Runs a fixed number of passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassBudget {
    remaining: usize,
}

impl PassBudget {
    pub fn new(passes: usize) -> Self {
        Self { remaining: passes }
    }
}

impl Default for PassBudget {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ConvergenceCriterion for PassBudget {
    fn keep_refining(&mut self, _points: &PointCloud) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Delaunay faces on the cloud's best projection plane.
///
/// Reports the mean edge length as its alpha.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelaunaySurface;

impl SurfaceBuilder for DelaunaySurface {
    fn build(&mut self, points: &PointCloud) -> Result<Surface, RefineError> {
        let positions = points.dehomogenized();
        let faces = delaunay_faces(&positions);
        let alpha = mean_edge_length(&positions, &faces);
        Ok(Surface { faces, alpha })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_pass_budget() {
        let cloud = PointCloud::default();
        let mut budget = PassBudget::new(2);
        assert!(budget.keep_refining(&cloud));
        assert!(budget.keep_refining(&cloud));
        assert!(!budget.keep_refining(&cloud));
        assert!(!PassBudget::new(0).keep_refining(&cloud));
    }

    #[test]
    fn test_delaunay_surface_alpha() {
        let cloud = PointCloud::from_positions(&[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ]);
        let surface = DelaunaySurface.build(&cloud).unwrap();
        assert_eq!(surface.faces.len(), 2);
        let expected = (2.0 * 2.0 + 8f32.sqrt()) / 3.0;
        assert!((surface.alpha - expected).abs() < 1e-5);
    }
}
