//! The pass loop: surface, camera selection, densification, filtering.

use glam::Mat4;
use recon_data::{Mesh, PointCloud, SceneStore, fill_background};
use tracing::{debug, info, warn};

use crate::collab::{ConvergenceCriterion, FlowEstimator, Renderer, SurfaceBuilder, Triangulator};
use crate::config::{LoopConfig, PairPolicy, RefineConfig};
use crate::density::DensityFilter;
use crate::error::RefineError;
use crate::selector::CameraSelector;

/// The external geometry stages one pass drives.
pub struct Collaborators<'a> {
    pub surface: &'a mut dyn SurfaceBuilder,
    pub renderer: &'a mut dyn Renderer,
    pub flow: &'a mut dyn FlowEstimator,
    pub triangulator: &'a mut dyn Triangulator,
}

/// What one pass did to the cloud.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub faces: usize,
    /// Main/side pairs that were warped and matched.
    pub pairs: usize,
    pub added: usize,
    pub removed: usize,
    /// Cloud size after the pass.
    pub points: usize,
}

/// Owns the point cloud across passes, with the selector and filter that
/// reshape it.
#[derive(Debug, Clone)]
pub struct Refinement {
    config: LoopConfig,
    points: PointCloud,
    selector: CameraSelector,
    filter: DensityFilter,
    alphas: Vec<f32>,
    passes: usize,
}

impl Refinement {
    pub fn new(config: &RefineConfig, points: PointCloud) -> Self {
        Self {
            config: config.refinement,
            points,
            selector: CameraSelector::new(config.selector),
            filter: DensityFilter::new(config.density),
            alphas: Vec::new(),
            passes: 0,
        }
    }

    /// Start from the scene's tracked bundles.
    pub fn from_scene<S: SceneStore + ?Sized>(config: &RefineConfig, scene: &S) -> Self {
        Self::new(config, scene.initial_points())
    }

    pub fn points(&self) -> &PointCloud {
        &self.points
    }

    pub fn into_points(self) -> PointCloud {
        self.points
    }

    pub fn selector(&self) -> &CameraSelector {
        &self.selector
    }

    /// Every surface alpha seen so far, oldest first.
    pub fn alphas(&self) -> &[f32] {
        &self.alphas
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn log_alpha(&mut self, alpha: f32) {
        if alpha > 0.0 && alpha.is_finite() {
            self.alphas.push(alpha);
        } else {
            warn!("Ignoring surface alpha {}", alpha);
        }
    }

    /// Run passes while `criterion` asks for more, up to the configured cap.
    pub fn run<S, C>(
        &mut self,
        scene: &S,
        collab: &mut Collaborators<'_>,
        criterion: &mut C,
    ) -> Result<Vec<PassReport>, RefineError>
    where
        S: SceneStore + ?Sized,
        C: ConvergenceCriterion + ?Sized,
    {
        let mut reports = Vec::new();
        while criterion.keep_refining(&self.points) {
            if reports.len() >= self.config.max_passes {
                warn!("Stopping after the cap of {} passes", self.config.max_passes);
                break;
            }
            reports.push(self.run_pass(scene, collab)?);
        }
        Ok(reports)
    }

    /// One pass over the current cloud.
    #[tracing::instrument(skip_all, fields(pass = self.passes, points = self.points.len()))]
    pub fn run_pass<S: SceneStore + ?Sized>(
        &mut self,
        scene: &S,
        collab: &mut Collaborators<'_>,
    ) -> Result<PassReport, RefineError> {
        let surface = collab.surface.build(&self.points)?;
        self.log_alpha(surface.alpha);
        let mesh = Mesh::from_cloud(&self.points, surface.faces);
        info!(
            "Converted {} points into {} faces",
            self.points.len(),
            mesh.face_count()
        );
        collab.renderer.load_mesh(&mesh)?;

        let cameras = scene.all_cameras();
        let mut cursor = self.selector.select(&mesh, &cameras, &mut *collab.renderer)?.cursor();

        let mut report = PassReport {
            faces: mesh.face_count(),
            ..PassReport::default()
        };
        let mut main = cursor.begin_main();
        while let Some(main_frame) = main {
            let main_camera = cameras[main_frame];
            let main_image = scene.frame(main_frame);
            let depth = collab.renderer.depth(main_camera)?;

            let mut flows = Vec::new();
            let mut side_cameras: Vec<Mat4> = Vec::new();
            let mut side = cursor.begin_side(main_frame);
            while let Some(side_frame) = side {
                let mut warped = collab.renderer.projected(
                    main_camera,
                    scene.frame(side_frame),
                    cameras[side_frame],
                )?;
                fill_background(&mut warped, main_image, &depth);
                let mut flow = collab.flow.flow(main_image, &warped)?;
                flow.mask_background(&depth);
                flows.push(flow);
                side_cameras.push(cameras[side_frame]);
                debug!("Matched side camera {} against main camera {}", side_frame, main_frame);

                if self.config.pair_policy == PairPolicy::FirstPair {
                    break;
                }
                side = cursor.next_side(main_frame);
            }

            if !flows.is_empty() {
                let fresh = collab
                    .triangulator
                    .triangulate(&flows, main_camera, &side_cameras, &depth)?;
                report.pairs += flows.len();
                report.added += fresh.len();
                self.points.append(fresh);
                info!("{} points after main camera {}", self.points.len(), main_frame);
            }

            if self.config.pair_policy == PairPolicy::FirstPair {
                break;
            }
            main = cursor.next_main();
        }

        match self.alphas.last() {
            Some(&alpha) => {
                let radius = self.filter.radius_for_alpha(alpha);
                report.removed = self.filter.filter(&mut self.points, radius).removed();
            }
            None => warn!("No surface alpha recorded yet, density filter skipped"),
        }

        report.points = self.points.len();
        self.passes += 1;
        info!(
            "Pass {}: {} pairs, {} added, {} removed, {} points",
            self.passes, report.pairs, report.added, report.removed, report.points
        );
        Ok(report)
    }
}
