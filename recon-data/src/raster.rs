//! Raster buffers exchanged with the renderer and the flow estimator.

use glam::Vec2;
use image::Rgb32FImage;

/// Per-pixel NDC depth as seen from one camera.
///
/// Row 0 is the top of the image (NDC `y = +1`). Pixels that no geometry
/// covers hold [`DepthBuffer::BACKGROUND`].
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl DepthBuffer {
    pub const BACKGROUND: f32 = f32::INFINITY;

    /// A buffer where every pixel is background.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![Self::BACKGROUND; (width * height) as usize],
        }
    }

    /// Wrap existing row-major values. Returns `None` on a size mismatch.
    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Option<Self> {
        (values.len() == (width * height) as usize).then_some(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, depth: f32) {
        self.values[(y * self.width + x) as usize] = depth;
    }

    pub fn is_background(&self, x: u32, y: u32) -> bool {
        self.get(x, y) == Self::BACKGROUND
    }

    /// Depth under an NDC position, clamped to the buffer edges.
    ///
    /// A buffer without pixels reads as background everywhere.
    pub fn at_ndc(&self, ndc: Vec2) -> f32 {
        if self.values.is_empty() {
            return Self::BACKGROUND;
        }
        let (x, y) = self.ndc_to_pixel(ndc);
        self.get(x, y)
    }

    /// Pixel containing an NDC position, clamped to the buffer edges.
    pub fn ndc_to_pixel(&self, ndc: Vec2) -> (u32, u32) {
        let col = ((ndc.x + 1.0) * 0.5 * self.width as f32).floor();
        let row = ((1.0 - ndc.y) * 0.5 * self.height as f32).floor();
        (
            col.clamp(0.0, (self.width.max(1) - 1) as f32) as u32,
            row.clamp(0.0, (self.height.max(1) - 1) as f32) as u32,
        )
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Dense per-pixel displacement between two images.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    width: u32,
    height: u32,
    vectors: Vec<Vec2>,
}

impl FlowField {
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            vectors: vec![Vec2::ZERO; (width * height) as usize],
        }
    }

    pub fn from_vectors(width: u32, height: u32, vectors: Vec<Vec2>) -> Option<Self> {
        (vectors.len() == (width * height) as usize).then_some(Self {
            width,
            height,
            vectors,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Vec2 {
        self.vectors[(y * self.width + x) as usize]
    }

    pub fn vectors(&self) -> &[Vec2] {
        &self.vectors
    }

    /// Zero every vector whose pixel has no geometry in `depth`.
    ///
    /// Sizes must agree; on a mismatch the whole field is zeroed.
    pub fn mask_background(&mut self, depth: &DepthBuffer) {
        if depth.width() != self.width || depth.height() != self.height {
            self.vectors.fill(Vec2::ZERO);
            return;
        }
        for (vector, value) in self.vectors.iter_mut().zip(depth.values()) {
            if *value == DepthBuffer::BACKGROUND {
                *vector = Vec2::ZERO;
            }
        }
    }
}

/// Bilinearly sample one channel at a sub-pixel position.
///
/// Pixel centers sit at integer coordinates. Returns `None` outside the image
/// or for a channel the image does not have.
pub fn sample_channel(image: &Rgb32FImage, channel: usize, x: f32, y: f32) -> Option<f32> {
    let (width, height) = image.dimensions();
    if channel >= 3 || width == 0 || height == 0 || !x.is_finite() || !y.is_finite() {
        return None;
    }
    if x < 0.0 || y < 0.0 || x > (width - 1) as f32 || y > (height - 1) as f32 {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let at = |px: u32, py: u32| image.get_pixel(px, py).0[channel];
    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    Some(top * (1.0 - fy) + bottom * fy)
}

/// Replace pixels of `target` that show background in `depth` with `fill`.
pub fn fill_background(target: &mut Rgb32FImage, fill: &Rgb32FImage, depth: &DepthBuffer) {
    if target.dimensions() != fill.dimensions()
        || target.dimensions() != (depth.width(), depth.height())
    {
        tracing::warn!("fill_background: size mismatch, image left unchanged");
        return;
    }
    for (x, y, pixel) in target.enumerate_pixels_mut() {
        if depth.is_background(x, y) {
            *pixel = *fill.get_pixel(x, y);
        }
    }
}
