//! Radiometric exposure normalization across frames.
//!
//! Tracked bundles are reprojected into every frame they were seen in and
//! the image is sampled there. The samples are modelled as
//! `brightness[frame, point] = exposure[frame] * reflectance[point]` and the
//! two factors are fitted by alternating weighted averages.

use std::io::Write;

use recon_data::{SceneStore, dehomogenize, sample_channel};
use tracing::{debug, info, warn};

use crate::config::ExposureConfig;
use crate::error::RefineError;

/// Sparse brightness observations, frames by points.
#[derive(Debug, Clone, PartialEq)]
pub struct BrightnessSamples {
    frames: usize,
    points: usize,
    values: Vec<f32>,
    valid: Vec<bool>,
}

impl BrightnessSamples {
    /// A matrix with no valid sample.
    pub fn new(frames: usize, points: usize) -> Self {
        Self {
            frames,
            points,
            values: vec![0.0; frames * points],
            valid: vec![false; frames * points],
        }
    }

    /// Record a sample. Non-positive or non-finite values stay invalid.
    pub fn set(&mut self, frame: usize, point: usize, value: f32) {
        let idx = frame * self.points + point;
        let ok = value > 0.0 && value.is_finite();
        self.values[idx] = if ok { value } else { 0.0 };
        self.valid[idx] = ok;
    }

    pub fn get(&self, frame: usize, point: usize) -> Option<f32> {
        let idx = frame * self.points + point;
        self.valid[idx].then_some(self.values[idx])
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn point_count(&self) -> usize {
        self.points
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Sample `channel` of every frame at the reprojection of every bundle
    /// tracked in that frame.
    #[tracing::instrument(skip_all, fields(frames = scene.frame_count(), points = scene.point_count()))]
    pub fn from_scene<S: SceneStore + ?Sized>(scene: &S, channel: usize) -> Self {
        let initial = scene.initial_points();
        let clip = *scene.clip();
        let mut samples = Self::new(scene.frame_count(), scene.point_count());

        for frame in 0..scene.frame_count() {
            let camera = scene.camera(frame);
            let image = scene.frame(frame);
            for (point, bundle) in initial.points.iter().enumerate() {
                if !scene.visibility(point).contains(&frame) {
                    continue;
                }
                let projected = camera * *bundle;
                if projected.w == 0.0 {
                    continue;
                }
                let pixel = clip.to_pixel(dehomogenize(projected));
                if let Some(value) = sample_channel(image, channel, pixel.x, pixel.y) {
                    samples.set(frame, point, value);
                }
            }
        }

        debug!("Collected {} valid brightness samples", samples.valid_count());
        samples
    }
}

/// Fitted exposure and reflectance factors.
///
/// A zero entry means the frame or point had nothing to fit against.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureEstimate {
    pub exposure: Vec<f32>,
    pub reflectance: Vec<f32>,
    pub iterations: usize,
    pub converged: bool,
}

impl ExposureEstimate {
    /// Per-frame standard deviation of `brightness - exposure * reflectance`
    /// over the frame's valid samples; 0 for frames without any.
    pub fn residual_stddev(&self, samples: &BrightnessSamples) -> Vec<f32> {
        (0..samples.frame_count())
            .map(|frame| {
                let mut sum = 0.0f64;
                let mut count = 0usize;
                for point in 0..samples.point_count() {
                    if let Some(value) = samples.get(frame, point) {
                        let predicted = self.exposure[frame] as f64 * self.reflectance[point] as f64;
                        let diff = value as f64 - predicted;
                        sum += diff * diff;
                        count += 1;
                    }
                }
                if count == 0 {
                    0.0
                } else {
                    (sum / count as f64).sqrt() as f32
                }
            })
            .collect()
    }
}

/// Fits per-frame exposure from brightness samples and applies it to a scene.
#[derive(Debug, Clone, Default)]
pub struct ExposureNormalizer {
    config: ExposureConfig,
}

impl ExposureNormalizer {
    pub fn new(config: ExposureConfig) -> Self {
        Self { config }
    }

    /// Alternating weighted least squares on the sample matrix.
    pub fn estimate(&self, samples: &BrightnessSamples) -> ExposureEstimate {
        let frames = samples.frame_count();
        let points = samples.point_count();
        let mut exposure = vec![1.0f64; frames];
        let mut reflectance = vec![1.0f64; points];

        if frames == 0 {
            return ExposureEstimate {
                exposure: Vec::new(),
                reflectance: vec![0.0; points],
                iterations: 0,
                converged: true,
            };
        }

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.config.max_iterations {
            iterations += 1;

            for (point, value) in reflectance.iter_mut().enumerate() {
                let mut sum = 0.0;
                let mut weight = 0.0;
                for (frame, &e) in exposure.iter().enumerate() {
                    if e <= 0.0 {
                        continue;
                    }
                    if let Some(b) = samples.get(frame, point) {
                        sum += b as f64 / e;
                        weight += 1.0;
                    }
                }
                *value = if weight > 0.0 { sum / weight } else { 0.0 };
            }

            let mut change = 0.0;
            for (frame, value) in exposure.iter_mut().enumerate() {
                let mut sum = 0.0;
                let mut weight = 0.0;
                for (point, &r) in reflectance.iter().enumerate() {
                    if r <= 0.0 {
                        continue;
                    }
                    if let Some(b) = samples.get(frame, point) {
                        sum += b as f64 / r;
                        weight += 1.0;
                    }
                }
                let updated = if weight > 0.0 { sum / weight } else { 0.0 };
                change += (*value - updated).powi(2);
                *value = updated;
            }

            if change / (frames as f64) < self.config.tolerance as f64 {
                converged = true;
                break;
            }
        }

        if converged {
            debug!("Exposure converged in {} iterations", iterations);
        } else {
            warn!(
                "Exposure did not converge within {} iterations, using current estimate",
                iterations
            );
        }

        ExposureEstimate {
            exposure: exposure.into_iter().map(|e| e as f32).collect(),
            reflectance: reflectance.into_iter().map(|r| r as f32).collect(),
            iterations,
            converged,
        }
    }

    /// Sample the scene, fit exposure and divide every frame by its factor.
    ///
    /// Fails if the scene's frames were normalized before.
    #[tracing::instrument(skip_all)]
    pub fn normalize_scene<S: SceneStore + ?Sized>(
        &self,
        scene: &mut S,
    ) -> Result<(ExposureEstimate, BrightnessSamples), RefineError> {
        info!("Estimating exposure values...");
        let samples = BrightnessSamples::from_scene(scene, self.config.channel);
        let estimate = self.estimate(&samples);
        scene.apply_exposure(&estimate.exposure)?;
        Ok((estimate, samples))
    }
}

/// Write the two-column `exposure<TAB>stddev` table, one line per frame.
pub fn write_exposure_table<W: Write>(
    mut writer: W,
    estimate: &ExposureEstimate,
    stddev: &[f32],
) -> std::io::Result<()> {
    for (exposure, deviation) in estimate.exposure.iter().zip(stddev) {
        writeln!(writer, "{:.6}\t{:.6}", exposure, deviation)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec4};
    use image::{Rgb, Rgb32FImage};
    use recon_data::{ClipInfo, Frame, Scene, SceneError, Track};

    fn synthetic(exposure: &[f32], color: &[f32]) -> BrightnessSamples {
        let mut samples = BrightnessSamples::new(exposure.len(), color.len());
        for (i, e) in exposure.iter().enumerate() {
            for (j, c) in color.iter().enumerate() {
                samples.set(i, j, e * c);
            }
        }
        samples
    }

    fn assert_up_to_scale(estimated: &[f32], truth: &[f32]) {
        let scale = estimated[0] / truth[0];
        for (e, t) in estimated.iter().zip(truth) {
            assert!((e / t - scale).abs() < 1e-4, "{e} vs {t} (scale {scale})");
        }
    }

    #[test]
    fn test_recovers_factors_up_to_scale() {
        let exposure = [1.0, 0.5, 2.0, 1.25];
        let color = [0.2, 0.4, 0.9, 0.3, 0.7];
        let samples = synthetic(&exposure, &color);

        let estimate = ExposureNormalizer::default().estimate(&samples);
        assert!(estimate.converged);
        assert_up_to_scale(&estimate.exposure, &exposure);
        assert_up_to_scale(&estimate.reflectance, &color);
        for deviation in estimate.residual_stddev(&samples) {
            assert!(deviation < 1e-4);
        }
    }

    #[test]
    fn test_recovers_factors_with_missing_samples() {
        let exposure = [1.0, 0.5, 2.0];
        let color = [0.2, 0.4, 0.9, 0.3];
        let mut samples = synthetic(&exposure, &color);
        // each frame still shares points with the others
        samples.set(0, 3, 0.0);
        samples.set(2, 0, 0.0);

        let estimate = ExposureNormalizer::default().estimate(&samples);
        assert!(estimate.converged);
        assert_up_to_scale(&estimate.exposure, &exposure);
        assert_up_to_scale(&estimate.reflectance, &color);
    }

    #[test]
    fn test_unobserved_entities_are_zero() {
        let mut samples = BrightnessSamples::new(3, 3);
        samples.set(0, 0, 1.0);
        samples.set(1, 0, 2.0);
        samples.set(0, 1, 0.5);
        samples.set(1, 1, 1.0);
        // frame 2 and point 2 have no valid sample
        samples.set(2, 2, -1.0);

        let estimate = ExposureNormalizer::default().estimate(&samples);
        assert_eq!(estimate.exposure[2], 0.0);
        assert_eq!(estimate.reflectance[2], 0.0);
        assert!(estimate.exposure.iter().all(|e| e.is_finite()));
        assert!(estimate.reflectance.iter().all(|r| r.is_finite()));
        assert_eq!(estimate.residual_stddev(&samples)[2], 0.0);
    }

    #[test]
    fn test_iteration_cap_returns_best_effort() {
        let samples = synthetic(&[1.0, 3.0], &[0.5, 0.25]);
        let normalizer = ExposureNormalizer::new(ExposureConfig {
            tolerance: 0.0,
            max_iterations: 3,
            ..ExposureConfig::default()
        });
        let estimate = normalizer.estimate(&samples);
        assert!(!estimate.converged);
        assert_eq!(estimate.iterations, 3);
        assert_up_to_scale(&estimate.exposure, &[1.0, 3.0]);
    }

    #[test]
    fn test_exposure_table_format() {
        let estimate = ExposureEstimate {
            exposure: vec![1.0, 0.5],
            reflectance: vec![],
            iterations: 1,
            converged: true,
        };
        let mut out = Vec::new();
        write_exposure_table(&mut out, &estimate, &[0.0, 0.25]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1.000000\t0.000000\n0.500000\t0.250000\n"
        );
    }

    #[test]
    fn test_normalize_scene_equalizes_frames() {
        // Identity cameras: a bundle at (x, y, 0, 1) lands at NDC (x, y).
        let clip = ClipInfo::new(8, 8, 4.0, 4.0);
        let frames = [1.0f32, 0.5]
            .iter()
            .map(|&gain| {
                let mut image = Rgb32FImage::from_pixel(8, 8, Rgb([0.0, 0.0, 0.0]));
                for x in 0..8 {
                    for y in 0..8 {
                        let value = if x < 4 { 0.4 } else { 0.8 };
                        image.put_pixel(x, y, Rgb([0.0, value * gain, 0.0]));
                    }
                }
                Frame::new(image, Mat4::IDENTITY, 0.1, 10.0)
            })
            .collect();
        let tracks = vec![
            Track::new(Vec4::new(-0.5, 0.0, 0.0, 1.0), [0, 1]),
            Track::new(Vec4::new(0.5, 0.0, 0.0, 1.0), [0, 1]),
        ];
        let mut scene = Scene::new(clip, frames, tracks).unwrap();

        let normalizer = ExposureNormalizer::default();
        let (estimate, samples) = normalizer.normalize_scene(&mut scene).unwrap();
        assert_eq!(samples.valid_count(), 4);
        assert!((estimate.exposure[1] / estimate.exposure[0] - 0.5).abs() < 1e-4);

        let a = scene.frame(0).get_pixel(6, 4).0[1];
        let b = scene.frame(1).get_pixel(6, 4).0[1];
        assert!((a - b).abs() < 1e-4);

        assert!(matches!(
            normalizer.normalize_scene(&mut scene),
            Err(RefineError::Scene(SceneError::ExposureAlreadyApplied))
        ));
    }
}
