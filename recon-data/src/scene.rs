//! In-memory scene: calibrated frames, cached images and point tracks.

use std::collections::BTreeSet;

use glam::{Mat4, Vec2, Vec3, Vec4};
use image::Rgb32FImage;
use tracing::{debug, info, warn};

use crate::error::SceneError;
use crate::types::PointCloud;

/// Image geometry of the clip: size, principal point and radial distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipInfo {
    pub width: u32,
    pub height: u32,
    /// Principal point in pixels, already shifted onto the pixel grid.
    pub center_x: f32,
    pub center_y: f32,
    /// Radial distortion coefficients `k1`, `k2`.
    pub distortion: [f32; 2],
}

impl ClipInfo {
    pub fn new(width: u32, height: u32, center_x: f32, center_y: f32) -> Self {
        Self {
            width,
            height,
            center_x,
            center_y,
            distortion: [0.0, 0.0],
        }
    }

    pub fn with_distortion(mut self, k1: f32, k2: f32) -> Self {
        self.distortion = [k1, k2];
        self
    }

    /// Height over width.
    pub fn aspect(&self) -> f32 {
        self.height as f32 / self.width as f32
    }

    /// Radial scale factor applied to a dehomogenized projection.
    pub fn distortion_factor(&self, ndc: Vec3) -> f32 {
        let aspect = self.aspect();
        let radius_sq = (ndc.x * ndc.x + ndc.y * ndc.y * aspect * aspect) / 4.0;
        let [k1, k2] = self.distortion;
        1.0 + radius_sq * (k1 + radius_sq * k2)
    }

    /// Map a dehomogenized projection to pixel coordinates (row 0 at the top).
    pub fn to_pixel(&self, ndc: Vec3) -> Vec2 {
        let screen = ndc * self.distortion_factor(ndc);
        Vec2::new(
            self.center_x + screen.x * self.width as f32 * 0.5,
            self.height as f32 - self.center_y - screen.y * self.height as f32 * 0.5,
        )
    }
}

/// One calibrated frame of the clip.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Rgb32FImage,
    pub camera: Mat4,
    pub near: f32,
    pub far: f32,
    pub exposure: f32,
}

impl Frame {
    pub fn new(image: Rgb32FImage, camera: Mat4, near: f32, far: f32) -> Self {
        Self {
            image,
            camera,
            near,
            far,
            exposure: 1.0,
        }
    }
}

/// A tracked bundle and the frames it was observed in.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub bundle: Vec4,
    pub frames: BTreeSet<usize>,
}

impl Track {
    pub fn new(bundle: Vec4, frames: impl IntoIterator<Item = usize>) -> Self {
        Self {
            bundle,
            frames: frames.into_iter().collect(),
        }
    }
}

/// Read access to a calibrated clip, plus the one-shot exposure correction.
pub trait SceneStore {
    fn frame_count(&self) -> usize;

    fn frame(&self, index: usize) -> &Rgb32FImage;

    fn camera(&self, index: usize) -> Mat4;

    fn near(&self, index: usize) -> f32;

    fn far(&self, index: usize) -> f32;

    fn all_cameras(&self) -> Vec<Mat4> {
        (0..self.frame_count()).map(|i| self.camera(i)).collect()
    }

    fn clip(&self) -> &ClipInfo;

    /// Number of tracked bundles.
    fn point_count(&self) -> usize;

    /// Frames in which bundle `point` was tracked.
    fn visibility(&self, point: usize) -> &BTreeSet<usize>;

    /// The tracked bundles as the initial point cloud.
    fn initial_points(&self) -> PointCloud;

    /// Divide every cached frame by its exposure factor.
    ///
    /// May succeed at most once per scene.
    fn apply_exposure(&mut self, factors: &[f32]) -> Result<(), SceneError>;
}

/// A fully loaded scene held in memory.
#[derive(Debug, Clone)]
pub struct Scene {
    clip: ClipInfo,
    frames: Vec<Frame>,
    tracks: Vec<Track>,
    exposure_applied: bool,
}

impl Scene {
    /// Validate and assemble a scene.
    ///
    /// Non-positive clip distances are fatal. Track references to frames past
    /// the end of the clip are dropped.
    pub fn new(clip: ClipInfo, frames: Vec<Frame>, mut tracks: Vec<Track>) -> Result<Self, SceneError> {
        for (index, frame) in frames.iter().enumerate() {
            if !(frame.near > 0.0 && frame.far > 0.0) {
                return Err(SceneError::InvalidClip {
                    frame: index,
                    near: frame.near,
                    far: frame.far,
                });
            }
        }

        let frame_count = frames.len();
        let mut dropped = 0;
        for track in &mut tracks {
            let before = track.frames.len();
            track.frames.retain(|&f| f < frame_count);
            dropped += before - track.frames.len();
        }
        if dropped > 0 {
            warn!("Dropped {} track observations past the last calibrated frame", dropped);
        }

        info!("Scene: {} frames, {} tracks", frame_count, tracks.len());
        Ok(Self {
            clip,
            frames,
            tracks,
            exposure_applied: false,
        })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn exposure(&self, index: usize) -> f32 {
        self.frames[index].exposure
    }

    pub fn exposure_applied(&self) -> bool {
        self.exposure_applied
    }
}

impl SceneStore for Scene {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame(&self, index: usize) -> &Rgb32FImage {
        &self.frames[index].image
    }

    fn camera(&self, index: usize) -> Mat4 {
        self.frames[index].camera
    }

    fn near(&self, index: usize) -> f32 {
        self.frames[index].near
    }

    fn far(&self, index: usize) -> f32 {
        self.frames[index].far
    }

    fn all_cameras(&self) -> Vec<Mat4> {
        self.frames.iter().map(|f| f.camera).collect()
    }

    fn clip(&self) -> &ClipInfo {
        &self.clip
    }

    fn point_count(&self) -> usize {
        self.tracks.len()
    }

    fn visibility(&self, point: usize) -> &BTreeSet<usize> {
        &self.tracks[point].frames
    }

    fn initial_points(&self) -> PointCloud {
        PointCloud::new(self.tracks.iter().map(|t| t.bundle).collect())
    }

    fn apply_exposure(&mut self, factors: &[f32]) -> Result<(), SceneError> {
        if self.exposure_applied {
            return Err(SceneError::ExposureAlreadyApplied);
        }
        if factors.len() != self.frames.len() {
            return Err(SceneError::ExposureLength {
                expected: self.frames.len(),
                actual: factors.len(),
            });
        }

        for (index, (frame, &factor)) in self.frames.iter_mut().zip(factors).enumerate() {
            if factor <= 0.0 || !factor.is_finite() {
                warn!("Frame {} has unknown exposure, left unscaled", index);
                frame.exposure = 0.0;
                continue;
            }
            for value in frame.image.iter_mut() {
                *value /= factor;
            }
            frame.exposure = factor;
        }
        self.exposure_applied = true;
        debug!("Applied exposure to {} frames", self.frames.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(near: f32, far: f32) -> Frame {
        Frame::new(Rgb32FImage::from_pixel(2, 2, Rgb([1.0, 2.0, 3.0])), Mat4::IDENTITY, near, far)
    }

    #[test]
    fn test_invalid_clip_rejected() {
        let clip = ClipInfo::new(2, 2, 1.0, 1.0);
        let result = Scene::new(clip, vec![frame(0.1, 10.0), frame(0.0, 10.0)], vec![]);
        assert!(matches!(result, Err(SceneError::InvalidClip { frame: 1, .. })));
        let result = Scene::new(clip, vec![frame(0.1, -1.0)], vec![]);
        assert!(matches!(result, Err(SceneError::InvalidClip { frame: 0, .. })));
    }

    #[test]
    fn test_track_frames_past_end_dropped() {
        let clip = ClipInfo::new(2, 2, 1.0, 1.0);
        let tracks = vec![Track::new(Vec4::W, [0, 1, 5])];
        let scene = Scene::new(clip, vec![frame(0.1, 1.0), frame(0.1, 1.0)], tracks).unwrap();
        assert_eq!(scene.visibility(0).iter().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_apply_exposure_once() {
        let clip = ClipInfo::new(2, 2, 1.0, 1.0);
        let mut scene = Scene::new(clip, vec![frame(0.1, 1.0), frame(0.1, 1.0)], vec![]).unwrap();
        scene.apply_exposure(&[2.0, 0.0]).unwrap();
        assert_eq!(scene.frame(0).get_pixel(0, 0), &Rgb([0.5, 1.0, 1.5]));
        // unknown exposure leaves the frame as it was
        assert_eq!(scene.frame(1).get_pixel(0, 0), &Rgb([1.0, 2.0, 3.0]));
        assert_eq!(scene.exposure(1), 0.0);
        assert!(matches!(
            scene.apply_exposure(&[1.0, 1.0]),
            Err(SceneError::ExposureAlreadyApplied)
        ));
    }

    #[test]
    fn test_to_pixel_center() {
        let clip = ClipInfo::new(640, 480, 320.0, 240.0);
        let pixel = clip.to_pixel(Vec3::ZERO);
        assert_eq!(pixel, Vec2::new(320.0, 240.0));
        let corner = clip.to_pixel(Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(corner, Vec2::new(640.0, 0.0));
    }
}
