//! Feature detection, description and pairwise matching.
//!
//! Provides the default capability implementations consumed by the
//! stitching orchestrator: an ORB-style detector (FAST corners + oriented
//! binary descriptors), brute-force Hamming matching with a ratio test, and
//! RANSAC homography verification that turns raw descriptor matches into
//! confidence-scored pairwise geometry.

pub mod descriptor;
pub mod fast;
pub mod homography;
pub mod matcher;
pub mod orb;
pub mod pairwise;

pub use descriptor::*;
pub use fast::*;
pub use homography::*;
pub use matcher::*;
pub use orb::*;
pub use pairwise::*;

pub use pano_core::{Error, Result};
