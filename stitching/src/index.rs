//! Run-scoped feature index: every image's feature set plus the full
//! pairwise match matrix, built exactly once over the original batch.

use crate::loader::ImageLoader;
use image::RgbImage;
use pano_core::{Error, Result};
use pano_features::{match_features_all, orb_detect_and_compute, ImageFeatures, MatchesInfo};
use rayon::prelude::*;

/// Extracts one image's feature set, tagged with its original batch index.
pub trait FeatureDetector: Send + Sync {
    fn detect(&self, image: &RgbImage, img_idx: usize) -> Result<ImageFeatures>;
}

/// Default detector: ORB-style keypoints and binary descriptors.
pub struct OrbDetector {
    pub n_features: usize,
}

impl Default for OrbDetector {
    fn default() -> Self {
        Self { n_features: 500 }
    }
}

impl FeatureDetector for OrbDetector {
    fn detect(&self, image: &RgbImage, img_idx: usize) -> Result<ImageFeatures> {
        let gray = image::imageops::grayscale(image);
        let (keypoints, descriptors) = orb_detect_and_compute(&gray, self.n_features);
        Ok(ImageFeatures {
            img_idx,
            width: image.width(),
            height: image.height(),
            keypoints,
            descriptors,
        })
    }
}

/// Computes the full ordered-pair match matrix for a batch of feature sets.
pub trait PairwiseMatcher {
    fn match_features(&self, features: &[ImageFeatures]) -> Result<Vec<MatchesInfo>>;
}

/// Default matcher: best-of-2-nearest with RANSAC homography verification.
#[derive(Debug, Default)]
pub struct BestOf2NearestMatcher;

impl PairwiseMatcher for BestOf2NearestMatcher {
    fn match_features(&self, features: &[ImageFeatures]) -> Result<Vec<MatchesInfo>> {
        Ok(match_features_all(features))
    }
}

/// Immutable for the rest of the run once built. Rounds select rows and
/// columns from `matches`; nothing here is ever recomputed.
pub struct FeatureIndex {
    pub images: Vec<RgbImage>,
    pub features: Vec<ImageFeatures>,
    /// Row-major `n * n`: entry `i * n + j` is the ordered pair (i, j).
    pub matches: Vec<MatchesInfo>,
}

impl FeatureIndex {
    /// Load, detect and match the whole batch.
    ///
    /// Any decode failure aborts the run with `Error::Decode`; fewer than 2
    /// loaded images is `Error::InsufficientInput`.
    pub fn build(
        loader: &dyn ImageLoader,
        detector: &dyn FeatureDetector,
        matcher: &dyn PairwiseMatcher,
        paths: &[String],
    ) -> Result<Self> {
        let mut images = Vec::with_capacity(paths.len());
        for path in paths {
            images.push(loader.load(path)?);
        }
        if images.len() < 2 {
            return Err(Error::InsufficientInput {
                count: images.len(),
            });
        }

        log::info!("detecting features in {} images", images.len());
        let features: Vec<ImageFeatures> = images
            .par_iter()
            .enumerate()
            .map(|(i, img)| detector.detect(img, i))
            .collect::<Result<Vec<_>>>()?;

        log::info!("matching {} image pairs", images.len() * (images.len() - 1) / 2);
        let matches = matcher.match_features(&features)?;
        debug_assert_eq!(matches.len(), images.len() * images.len());

        Ok(Self {
            images,
            features,
            matches,
        })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Confidence of the ordered pair (i, j) in original index space.
    pub fn confidence(&self, i: usize, j: usize) -> f64 {
        self.matches[i * self.len() + j].confidence
    }

    pub fn match_at(&self, i: usize, j: usize) -> &MatchesInfo {
        &self.matches[i * self.len() + j]
    }
}
