//! Umbrella crate: re-exports the stitching pipeline and its building
//! blocks under one roof.
//!
//! Typical use goes through [`Stitcher`]: point it at a batch of image
//! paths and it returns zero or more panoramas plus an accounting of which
//! inputs each one consumed.

pub use pano_core as core;
pub use pano_features as features;
pub use pano_imgproc as imgproc;
pub use pano_stitching as stitching;

pub use pano_core::{Error, Result};
pub use pano_stitching::{Panorama, StitchOutcome, Stitcher};

/// Initialize a single global Rayon thread pool for detection and matching.
///
/// Call once at application startup before stitching large batches.
/// Repeated calls are idempotent and return the first initialization
/// result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `PANO_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<()> {
    pano_core::init_global_thread_pool(num_threads)
}
