//! Pixel-level primitives backing the warping and blending stages:
//! border-aware sampling, binary-mask morphology, and float image pyramids.

pub mod morph;
pub mod pyramid;
pub mod sample;

pub use morph::*;
pub use pyramid::*;
pub use sample::*;

pub use pano_core::{Error, Result};
