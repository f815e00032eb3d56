//! JSON scene description loading.
//!
//! The file names a clip (image size, principal point, distortion, one image
//! per frame), a camera per tracked frame and the tracked bundles. Frame
//! numbers in the file are 1-based.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use glam::{Mat4, Vec4};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::SceneError;
use crate::scene::{ClipInfo, Frame, Scene, Track};

#[derive(Deserialize, Debug)]
pub struct ClipEntry {
    pub width: u32,
    pub height: u32,
    pub center_x: f32,
    pub center_y: f32,
    #[serde(default)]
    pub distortion: [f32; 2],
    /// Frame images, relative to the scene file.
    pub frames: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct CameraEntry {
    pub frame: i64,
    pub near: f32,
    pub far: f32,
    /// Row-major 4x4 projection.
    pub projection: [[f32; 4]; 4],
}

#[derive(Deserialize, Debug)]
pub struct TrackEntry {
    pub bundle: [f32; 4],
    #[serde(default)]
    pub frames_enabled: Vec<i64>,
}

#[derive(Deserialize, Debug)]
pub struct SceneFile {
    pub clip: ClipEntry,
    #[serde(rename = "camera")]
    pub cameras: Vec<CameraEntry>,
    #[serde(default)]
    pub tracks: Vec<TrackEntry>,
}

/// Build a matrix from row-major rows.
pub fn mat4_from_rows(rows: [[f32; 4]; 4]) -> Mat4 {
    Mat4::from_cols_array_2d(&rows).transpose()
}

impl SceneFile {
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, SceneError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Clip geometry with the half-pixel grid shift applied.
    pub fn clip_info(&self) -> ClipInfo {
        ClipInfo::new(
            self.clip.width,
            self.clip.height,
            self.clip.center_x + 0.5,
            self.clip.center_y - 0.5,
        )
        .with_distortion(self.clip.distortion[0], self.clip.distortion[1])
    }

    /// Number of frames that have calibration, i.e. the highest camera frame.
    pub fn tracked_frame_count(&self) -> Result<usize, SceneError> {
        let available = self.clip.frames.len();
        let mut count = 0;
        for camera in &self.cameras {
            if camera.frame < 1 {
                return Err(SceneError::FrameOutOfRange {
                    frame: camera.frame,
                    frame_count: available,
                });
            }
            if camera.frame as usize > available {
                return Err(SceneError::MissingFrames {
                    needed: camera.frame as usize,
                    available,
                });
            }
            count = count.max(camera.frame as usize);
        }
        Ok(count)
    }

    /// Validate the description and load every tracked frame image.
    pub fn into_scene(self, base_dir: &Path) -> Result<Scene, SceneError> {
        let frame_count = self.tracked_frame_count()?;
        let clip = self.clip_info();

        let mut slots: Vec<Option<(Mat4, f32, f32)>> = vec![None; frame_count];
        for camera in &self.cameras {
            let index = (camera.frame - 1) as usize;
            slots[index] = Some((mat4_from_rows(camera.projection), camera.near, camera.far));
        }

        let mut frames = Vec::with_capacity(frame_count);
        for (index, slot) in slots.into_iter().enumerate() {
            let (camera, near, far) = slot.ok_or(SceneError::MissingCamera(index))?;
            let path = base_dir.join(&self.clip.frames[index]);
            debug!("Loading frame {} from {:?}", index, path);
            let image = image::open(&path)?.into_rgb32f();
            frames.push(Frame::new(image, camera, near, far));
        }

        let tracks = self
            .tracks
            .iter()
            .map(|t| {
                Track::new(
                    Vec4::from_array(t.bundle),
                    t.frames_enabled
                        .iter()
                        .filter(|&&f| f >= 1)
                        .map(|&f| (f - 1) as usize),
                )
            })
            .collect();

        Scene::new(clip, frames, tracks)
    }
}

/// Load a scene from a JSON description on disk.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_scene(path: impl AsRef<Path>) -> Result<Scene, SceneError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let description = SceneFile::from_reader(BufReader::new(file))?;
    info!(
        "Scene file parsed: {} cameras, {} tracks",
        description.cameras.len(),
        description.tracks.len()
    );
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    description.into_scene(base_dir)
}
