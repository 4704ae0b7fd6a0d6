//! Panorama stitching pipeline: feature indexing, confidence clustering,
//! camera estimation, spherical warping, exposure/seam/blend compositing,
//! and the orchestrator that iterates the cycle until every source image is
//! either consumed into a panorama or discarded.
//!
//! Every stage behind the orchestrator is a swappable capability trait, so
//! the iteration and index bookkeeping can be exercised independently of
//! any particular detector, solver or blender.

pub mod blend;
pub mod cluster;
pub mod composite;
pub mod estimate;
pub mod exposure;
pub mod index;
pub mod loader;
pub mod seam;
pub mod stitcher;
pub mod warp;

pub use blend::*;
pub use cluster::*;
pub use composite::*;
pub use estimate::*;
pub use exposure::*;
pub use index::*;
pub use loader::*;
pub use seam::*;
pub use stitcher::*;
pub use warp::*;

pub use pano_core::{Error, Result};
