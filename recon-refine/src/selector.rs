//! Stochastic choice of main/side camera pairs.
//!
//! Faces are drawn with probability proportional to their area. Each drawn
//! face gets a virtual viewer standing on it; the real cameras that can see
//! that viewer (and that it can see back, unoccluded) compete for the main
//! slot, and a second camera with a different angle onto the face becomes
//! its side. A tail of "miss" probability past the total area acts as the
//! stopping vote.

use glam::{Mat4, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use recon_data::{DepthBuffer, Mesh};
use tracing::{debug, info, warn};

use crate::collab::Renderer;
use crate::config::SelectorConfig;
use crate::error::RefineError;
use crate::selection::SelectionMap;
use crate::viewer::{FaceViewer, camera_center, in_unit_cube, project};

/// A scene camera with its optical center resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealCamera {
    pub frame: usize,
    pub matrix: Mat4,
    pub center: Vec3,
}

/// Resolve camera centers, skipping matrices that cannot be inverted.
pub fn real_cameras(cameras: &[Mat4]) -> Vec<RealCamera> {
    cameras
        .iter()
        .enumerate()
        .filter_map(|(frame, &matrix)| match camera_center(matrix) {
            Some(center) => Some(RealCamera { frame, matrix, center }),
            None => {
                debug!("Camera {} has no optical center, skipped", frame);
                None
            }
        })
        .collect()
}

/// How well one real camera and a face viewer see each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraLabel {
    pub frame: usize,
    /// `1 - (x² + y²)` of the camera center in the viewer's NDC.
    pub from_viewer: f32,
    /// `1 - (x² + y²)` of the viewer center in the camera's NDC.
    pub to_viewer: f32,
    /// NDC depth of the camera center as seen by the viewer.
    pub depth: f32,
}

/// Cameras that see `viewer` and are seen by it without an occluder between.
///
/// `depth` is the viewer's depth buffer of the current mesh.
pub fn filter_cameras(viewer: &FaceViewer, depth: &DepthBuffer, cameras: &[RealCamera]) -> Vec<CameraLabel> {
    cameras
        .iter()
        .filter_map(|camera| {
            let forward = project(viewer.matrix, camera.center).filter(|ndc| in_unit_cube(*ndc))?;
            let obstacle = depth.at_ndc(forward.truncate());
            if obstacle != DepthBuffer::BACKGROUND && obstacle < forward.z {
                return None;
            }
            let reverse = project(camera.matrix, viewer.center).filter(|ndc| in_unit_cube(*ndc))?;

            let from_viewer = 1.0 - forward.truncate().length_squared();
            let to_viewer = 1.0 - reverse.truncate().length_squared();
            (from_viewer >= 0.0 && to_viewer >= 0.0).then_some(CameraLabel {
                frame: camera.frame,
                from_viewer,
                to_viewer,
                depth: forward.z,
            })
        })
        .collect()
}

/// Index drawn with probability proportional to its weight.
///
/// All-zero weights fall back to a uniform draw.
pub fn weighted_index<R: Rng + ?Sized>(rng: &mut R, weights: &[f32]) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let total: f32 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Some(rng.random_range(0..weights.len()));
    }
    let choice = rng.random::<f32>() * total;
    let mut accumulated = 0.0;
    for (i, &weight) in weights.iter().enumerate() {
        accumulated += weight;
        if accumulated > choice {
            return Some(i);
        }
    }
    // rounding pushed the draw past the last bucket
    weights.iter().rposition(|&w| w > 0.0)
}

/// Main camera: weight `from · to`, plus a bonus for frames that already are
/// a main camera.
pub fn choose_main<R: Rng + ?Sized>(
    rng: &mut R,
    labels: &[CameraLabel],
    selection: &SelectionMap,
    bonus: f32,
) -> Option<CameraLabel> {
    let weights: Vec<f32> = labels
        .iter()
        .map(|label| {
            let reuse = if selection.is_main(label.frame) { bonus } else { 0.0 };
            label.from_viewer * label.to_viewer + reuse
        })
        .collect();
    weighted_index(rng, &weights).map(|i| labels[i])
}

/// Side camera for `main`: weight `to · sqrt(1 - from²)`, plus a bonus for
/// sides already paired with `main`.
pub fn choose_side<R: Rng + ?Sized>(
    rng: &mut R,
    labels: &[CameraLabel],
    main: &CameraLabel,
    selection: &SelectionMap,
    bonus: f32,
) -> Option<CameraLabel> {
    let candidates: Vec<&CameraLabel> = labels.iter().filter(|l| l.frame != main.frame).collect();
    if candidates.is_empty() {
        debug!("No side cameras available for main camera {}", main.frame);
        return None;
    }
    let weights: Vec<f32> = candidates
        .iter()
        .map(|label| {
            let reuse = if selection.has_side(main.frame, label.frame) { bonus } else { 0.0 };
            label.to_viewer * (1.0 - label.from_viewer * label.from_viewer).max(0.0).sqrt() + reuse
        })
        .collect();
    weighted_index(rng, &weights).map(|i| *candidates[i])
}

/// Cumulative face areas; entry `i` is the area of faces `0..=i`.
fn area_prefix(mesh: &Mesh) -> Vec<f64> {
    let mut total = 0.0;
    (0..mesh.face_count())
        .map(|face| {
            let area = mesh.face_area(face) as f64;
            if area.is_finite() {
                total += area;
            }
            total
        })
        .collect()
}

/// Accumulates main/side pairings by repeated face sampling.
///
/// Owns its random generator; a fixed seed and scene give the same map.
#[derive(Debug, Clone)]
pub struct CameraSelector {
    config: SelectorConfig,
    rng: StdRng,
    selection: SelectionMap,
}

impl CameraSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(config.seed))
    }

    pub fn with_rng(config: SelectorConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng,
            selection: SelectionMap::new(),
        }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Pairs accumulated by the last [`CameraSelector::select`].
    pub fn selection(&self) -> &SelectionMap {
        &self.selection
    }

    /// Rebuild the selection for `mesh`, which must already be loaded into
    /// `renderer`.
    ///
    /// Returns an empty map when the mesh has no area or the draw cap is hit
    /// before any pair was found.
    #[tracing::instrument(skip_all, fields(faces = mesh.face_count(), cameras = cameras.len()))]
    pub fn select<R: Renderer + ?Sized>(
        &mut self,
        mesh: &Mesh,
        cameras: &[Mat4],
        renderer: &mut R,
    ) -> Result<&SelectionMap, RefineError> {
        self.selection.clear();

        let ends = area_prefix(mesh);
        let total = ends.last().copied().unwrap_or(0.0);
        if total <= 0.0 {
            warn!("Mesh has no area to sample, no cameras selected");
            return Ok(&self.selection);
        }
        let average = total / ends.len() as f64;
        let span = total + average * self.config.expected_misses.max(0.0) as f64;
        let cameras = real_cameras(cameras);

        let mut draws = 0;
        let mut stopped = false;
        while draws < self.config.max_samples {
            draws += 1;
            let choice = self.rng.random::<f64>() * span;
            if choice >= total {
                if !self.selection.is_empty() {
                    stopped = true;
                    break;
                }
                continue;
            }

            let face = ends.partition_point(|&end| end <= choice);
            let Some(viewer) = FaceViewer::new(mesh, face, &self.config) else {
                continue;
            };
            let depth = renderer.depth(viewer.matrix)?;
            let labels = filter_cameras(&viewer, &depth, &cameras);

            let Some(main) = choose_main(&mut self.rng, &labels, &self.selection, self.config.main_reuse_bonus)
            else {
                continue;
            };
            let Some(side) = choose_side(
                &mut self.rng,
                &labels,
                &main,
                &self.selection,
                self.config.side_reuse_bonus,
            ) else {
                continue;
            };
            self.selection.insert(main.frame, side.frame);
        }

        if !stopped {
            warn!(
                "Camera selection stopped at the cap of {} draws with {} pairs",
                draws,
                self.selection.pair_count()
            );
        }
        for main in self.selection.mains() {
            debug!("Main camera {}, side cameras {:?}", main, self.selection.sides(main));
        }
        info!(
            "Selected {} main cameras, {} pairs in {} draws",
            self.selection.main_count(),
            self.selection.pair_count(),
            draws
        );
        Ok(&self.selection)
    }
}
