//! Error types for refinement passes.

use recon_data::SceneError;
use thiserror::Error;

/// Errors that stop a refinement run.
///
/// Algorithmic degeneracies (no visible camera, a non-converging iteration)
/// are logged and skipped instead of surfacing here.
#[derive(Debug, Error)]
pub enum RefineError {
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("Renderer error: {0}")]
    Render(String),

    #[error("Surface reconstruction error: {0}")]
    Surface(String),

    #[error("Optical flow error: {0}")]
    Flow(String),

    #[error("Triangulation error: {0}")]
    Triangulation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
