use recon_data::SceneError;
use recon_refine::RefineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to load scene: {0}")]
    Scene(#[from] SceneError),

    #[error("Refinement failed: {0}")]
    Refine(#[from] RefineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
