//! Error types for scene loading and validation.

use thiserror::Error;

/// Errors raised while building or mutating a scene.
///
/// Everything here is a defect in the input data and is meant to abort a run
/// before refinement starts.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scene file parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image loading error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Camera frame {frame} is outside 1..={frame_count}")]
    FrameOutOfRange { frame: i64, frame_count: usize },

    #[error("Frame {frame} has invalid clip distances (near {near}, far {far})")]
    InvalidClip { frame: usize, near: f32, far: f32 },

    #[error("Frame {0} has no camera")]
    MissingCamera(usize),

    #[error("Scene needs {needed} frame images but only {available} were given")]
    MissingFrames { needed: usize, available: usize },

    #[error("Exposure has already been applied to the cached frames")]
    ExposureAlreadyApplied,

    #[error("Expected {expected} exposure factors, got {actual}")]
    ExposureLength { expected: usize, actual: usize },
}
