//! CPU reference renderer.
//!
//! Rasterizes the loaded mesh into an NDC depth buffer with a plain z-buffer
//! and warps images between cameras by unprojecting that depth.

use glam::{Mat4, Vec2, Vec3, Vec4};
use image::{Rgb, Rgb32FImage};
use recon_data::{DepthBuffer, Mesh, dehomogenize, sample_channel};
use recon_refine::viewer::project;
use recon_refine::{RefineError, Renderer};
use tracing::debug;

/// Signed doubled area of `(a, b, c)`.
fn edge(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Continuous pixel coordinates of an NDC position; row 0 is NDC y = +1.
fn ndc_to_screen(ndc: Vec2, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (ndc.x + 1.0) * 0.5 * width as f32,
        (1.0 - ndc.y) * 0.5 * height as f32,
    )
}

/// NDC of a pixel center.
fn pixel_to_ndc(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32 * 2.0 - 1.0,
        1.0 - (y as f32 + 0.5) / height as f32 * 2.0,
    )
}

#[derive(Debug, Clone)]
pub struct SoftwareRenderer {
    width: u32,
    height: u32,
    mesh: Mesh,
}

impl SoftwareRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mesh: Mesh::default(),
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    fn rasterize(&self, depth: &mut DepthBuffer, clip: [Vec4; 3]) {
        // no near-plane clipping: triangles crossing the camera plane are dropped
        if clip.iter().any(|c| c.w <= 0.0) {
            return;
        }
        let ndc = clip.map(|c| c.truncate() / c.w);
        let screen = ndc.map(|p| ndc_to_screen(p.truncate(), self.width, self.height));
        let area = edge(screen[0], screen[1], screen[2]);
        if area.abs() < 1e-12 || !area.is_finite() {
            return;
        }

        let min = screen[0].min(screen[1]).min(screen[2]);
        let max = screen[0].max(screen[1]).max(screen[2]);
        let x0 = (min.x - 0.5).floor().max(0.0) as i64;
        let y0 = (min.y - 0.5).floor().max(0.0) as i64;
        let x1 = ((max.x - 0.5).ceil() as i64).min(self.width as i64 - 1);
        let y1 = ((max.y - 0.5).ceil() as i64).min(self.height as i64 - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(screen[1], screen[2], p) / area;
                let w1 = edge(screen[2], screen[0], p) / area;
                let w2 = edge(screen[0], screen[1], p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let z = w0 * ndc[0].z + w1 * ndc[1].z + w2 * ndc[2].z;
                if !(-1.0..=1.0).contains(&z) {
                    continue;
                }
                let (px, py) = (x as u32, y as u32);
                if z < depth.get(px, py) {
                    depth.set(px, py, z);
                }
            }
        }
    }
}

impl Renderer for SoftwareRenderer {
    fn load_mesh(&mut self, mesh: &Mesh) -> Result<(), RefineError> {
        if let Some(bad) = mesh.faces.iter().flatten().find(|&&i| i >= mesh.vertices.len()) {
            return Err(RefineError::Render(format!(
                "face index {} out of {} vertices",
                bad,
                mesh.vertices.len()
            )));
        }
        self.mesh = mesh.clone();
        debug!("Loaded mesh: {} vertices, {} faces", mesh.vertices.len(), mesh.face_count());
        Ok(())
    }

    fn depth(&mut self, camera: Mat4) -> Result<DepthBuffer, RefineError> {
        let mut depth = DepthBuffer::empty(self.width, self.height);
        for face in 0..self.mesh.face_count() {
            let clip = self.mesh.corners(face).map(|p| camera * p.extend(1.0));
            self.rasterize(&mut depth, clip);
        }
        Ok(depth)
    }

    fn projected(
        &mut self,
        target_camera: Mat4,
        source: &Rgb32FImage,
        source_camera: Mat4,
    ) -> Result<Rgb32FImage, RefineError> {
        let det = target_camera.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(RefineError::Render("target camera is not invertible".into()));
        }
        let unproject = target_camera.inverse();
        let depth = self.depth(target_camera)?;
        let (source_width, source_height) = source.dimensions();

        let mut warped = Rgb32FImage::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                if depth.is_background(x, y) {
                    continue;
                }
                let ndc = pixel_to_ndc(x, y, self.width, self.height).extend(depth.get(x, y));
                let world: Vec3 = dehomogenize(unproject * ndc.extend(1.0));
                let Some(seen) = project(source_camera, world) else {
                    continue;
                };
                let at = ndc_to_screen(seen.truncate(), source_width, source_height) - Vec2::splat(0.5);
                let mut pixel = [0.0; 3];
                for (channel, value) in pixel.iter_mut().enumerate() {
                    match sample_channel(source, channel, at.x, at.y) {
                        Some(sample) => *value = sample,
                        None => break,
                    }
                }
                warped.put_pixel(x, y, Rgb(pixel));
            }
        }
        Ok(warped)
    }
}
