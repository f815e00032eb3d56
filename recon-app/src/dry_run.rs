//! Densification backend that matches nothing and adds no points.
//!
//! Lets the binary plan camera pairings and filter a tracked cloud without
//! a dense matcher installed.

use glam::Mat4;
use image::Rgb32FImage;
use recon_data::{DepthBuffer, FlowField};
use recon_refine::{FlowEstimator, RefineError, Triangulator};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct DryRun;

impl FlowEstimator for DryRun {
    fn flow(&mut self, reference: &Rgb32FImage, _moved: &Rgb32FImage) -> Result<FlowField, RefineError> {
        let (width, height) = reference.dimensions();
        Ok(FlowField::zeros(width, height))
    }
}

impl Triangulator for DryRun {
    fn triangulate(
        &mut self,
        flows: &[FlowField],
        _main_camera: Mat4,
        side_cameras: &[Mat4],
        _depth: &DepthBuffer,
    ) -> Result<Vec<glam::Vec4>, RefineError> {
        debug!(
            "Dry run: skipping triangulation of {} flows against {} side cameras",
            flows.len(),
            side_cameras.len()
        );
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_adds_nothing() {
        let image = Rgb32FImage::new(6, 4);
        let flow = DryRun.flow(&image, &image).unwrap();
        assert_eq!((flow.width(), flow.height()), (6, 4));
        assert!(flow.vectors().iter().all(|v| *v == glam::Vec2::ZERO));

        let points = DryRun
            .triangulate(&[flow], Mat4::IDENTITY, &[Mat4::IDENTITY], &DepthBuffer::empty(6, 4))
            .unwrap();
        assert!(points.is_empty());
    }
}
