//! Recon Refinement Crate
//!
//! The iterative point-cloud refinement engine. A run normalizes frame
//! exposure once, then repeats passes that mesh the cloud, pick camera pairs
//! from that mesh, densify from those pairs and thin the result.
//!
//! ## Modules
//!
//! - [`exposure`]: per-frame exposure and per-point reflectance fitting
//! - [`neighbors`]: radius-limited symmetric neighbor graph
//! - [`density`]: power-iteration density and the greedy sieve
//! - [`viewer`]: virtual viewers on mesh faces and projection helpers
//! - [`selector`]: stochastic main/side camera choice
//! - [`selection`]: the selection map and its cursor
//! - [`refine`]: the pass loop
//! - [`collab`]: traits for the renderer, surface, flow and triangulation stages

pub mod collab;
pub mod config;
pub mod density;
pub mod error;
pub mod exposure;
pub mod neighbors;
pub mod refine;
pub mod selection;
pub mod selector;
pub mod viewer;

pub use collab::{
    ConvergenceCriterion, DelaunaySurface, FlowEstimator, PassBudget, Renderer, Surface, SurfaceBuilder,
    Triangulator,
};
pub use config::{DensityConfig, ExposureConfig, LoopConfig, PairPolicy, RefineConfig, SelectorConfig};
pub use density::{DensityEstimate, DensityFilter, FilterReport};
pub use error::RefineError;
pub use exposure::{BrightnessSamples, ExposureEstimate, ExposureNormalizer, write_exposure_table};
pub use neighbors::{Edge, NeighborGraph};
pub use refine::{Collaborators, PassReport, Refinement};
pub use selection::{SelectionCursor, SelectionMap};
pub use selector::{CameraLabel, CameraSelector};
pub use viewer::FaceViewer;
