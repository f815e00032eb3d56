//! Recon Data Crate
//!
//! Scene, point cloud and raster types shared by the refinement engine and
//! the command-line tool. Nothing here runs a refinement algorithm; this crate
//! parses, validates and carries data.

pub mod error;
pub mod raster;
pub mod scene;
pub mod scene_file;
pub mod surface;
pub mod types;

pub use error::SceneError;
pub use raster::{DepthBuffer, FlowField, fill_background, sample_channel};
pub use scene::{ClipInfo, Frame, Scene, SceneStore, Track};
pub use scene_file::{load_scene, mat4_from_rows};
pub use surface::{ProjectionPlane, delaunay_faces, mean_edge_length};
pub use types::{Face, Mesh, PointCloud, dehomogenize};
