//! Best-of-2-nearest pairwise matching over a whole image batch.
//!
//! Produces the square match matrix the stitching pipeline keys everything
//! on: one `MatchesInfo` per ordered pair of original image indices, with a
//! RANSAC-verified homography and a confidence score. The matrix is built
//! exactly once per run; later rounds only select entries from it.

use crate::descriptor::Descriptors;
use crate::homography::{find_homography_ransac, PointPair, RansacConfig};
use crate::matcher::Matcher;
use nalgebra::Matrix3;
use pano_core::{FeatureMatch, KeyPoints, Matches};
use rayon::prelude::*;

/// Feature set for one image, tagged with its original batch index.
#[derive(Debug, Clone)]
pub struct ImageFeatures {
    pub img_idx: usize,
    pub width: u32,
    pub height: u32,
    pub keypoints: KeyPoints,
    pub descriptors: Descriptors,
}

/// Match geometry for one ordered pair (src, dst) of original indices.
#[derive(Debug, Clone)]
pub struct MatchesInfo {
    pub src_idx: usize,
    pub dst_idx: usize,
    pub matches: Matches,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    /// Maps src pixel coordinates to dst pixel coordinates.
    pub homography: Option<Matrix3<f64>>,
    pub confidence: f64,
}

impl MatchesInfo {
    pub fn empty(src_idx: usize, dst_idx: usize) -> Self {
        Self {
            src_idx,
            dst_idx,
            matches: Matches::new(),
            inliers: Vec::new(),
            num_inliers: 0,
            homography: None,
            confidence: 0.0,
        }
    }
}

/// Lowe ratio threshold for the descriptor matcher.
const MATCH_RATIO: f32 = 0.75;
/// Minimum raw matches before attempting geometric verification.
const MIN_RAW_MATCHES: usize = 8;
/// Minimum RANSAC inliers for a pair to carry geometry.
const MIN_INLIERS: usize = 6;

/// Match every unordered pair of feature sets and fill the full `n * n`
/// matrix in original index order (row-major: entry `i * n + j` is the
/// ordered pair (i, j)). The reverse entry of each matched pair holds the
/// inverse homography and the same confidence.
pub fn match_features_all(features: &[ImageFeatures]) -> Vec<MatchesInfo> {
    let n = features.len();

    let pair_list: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect();

    let results: Vec<(MatchesInfo, MatchesInfo)> = pair_list
        .par_iter()
        .map(|&(i, j)| match_pair(&features[i], &features[j]))
        .collect();

    let verified = results.iter().filter(|(f, _)| f.confidence > 0.0).count();
    log::debug!("verified {verified} of {} candidate pairs", pair_list.len());

    let mut matrix: Vec<MatchesInfo> = (0..n * n)
        .map(|idx| MatchesInfo::empty(idx / n, idx % n))
        .collect();
    for (forward, reverse) in results {
        let (i, j) = (forward.src_idx, forward.dst_idx);
        matrix[i * n + j] = forward;
        matrix[j * n + i] = reverse;
    }
    matrix
}

/// Match a single ordered pair and derive its reverse entry.
pub fn match_pair(src: &ImageFeatures, dst: &ImageFeatures) -> (MatchesInfo, MatchesInfo) {
    let forward = verify_pair(src, dst);
    let reverse = invert_matches(&forward, dst.img_idx, src.img_idx);
    (forward, reverse)
}

fn verify_pair(src: &ImageFeatures, dst: &ImageFeatures) -> MatchesInfo {
    let mut info = MatchesInfo::empty(src.img_idx, dst.img_idx);

    info.matches = Matcher::new()
        .with_ratio_test(MATCH_RATIO)
        .match_descriptors(&src.descriptors, &dst.descriptors);

    if info.matches.len() < MIN_RAW_MATCHES {
        return info;
    }

    let pairs: Vec<PointPair> = info
        .matches
        .iter()
        .map(|m| {
            let p1 = &src.descriptors.descriptors[m.query_idx].keypoint;
            let p2 = &dst.descriptors.descriptors[m.train_idx].keypoint;
            ((p1.x, p1.y), (p2.x, p2.y))
        })
        .collect();

    let Some(result) = find_homography_ransac(&pairs, &RansacConfig::default()) else {
        return info;
    };
    if result.num_inliers < MIN_INLIERS {
        return info;
    }

    info.inliers = result.inliers;
    info.num_inliers = result.num_inliers;
    info.homography = Some(result.homography);
    info.confidence = pair_confidence(result.num_inliers, info.matches.len());
    // Implausibly high confidence means near-duplicate frames; treating
    // them as unmatched keeps them out of the panorama graph.
    if info.confidence > 3.0 {
        info.confidence = 0.0;
    }
    info
}

/// Confidence of a verified pair: inliers against an affine prior on the
/// raw match count.
pub fn pair_confidence(num_inliers: usize, num_matches: usize) -> f64 {
    num_inliers as f64 / (8.0 + 0.3 * num_matches as f64)
}

fn invert_matches(forward: &MatchesInfo, src_idx: usize, dst_idx: usize) -> MatchesInfo {
    let mut reverse = MatchesInfo::empty(src_idx, dst_idx);
    reverse.matches = Matches {
        matches: forward
            .matches
            .iter()
            .map(|m| FeatureMatch::new(m.train_idx, m.query_idx, m.distance))
            .collect(),
    };
    reverse.inliers = forward.inliers.clone();
    reverse.num_inliers = forward.num_inliers;
    reverse.homography = forward
        .homography
        .as_ref()
        .and_then(|h| h.try_inverse())
        .map(|h| if h[(2, 2)].abs() > 1e-12 { h / h[(2, 2)] } else { h });
    reverse.confidence = forward.confidence;
    reverse
}
