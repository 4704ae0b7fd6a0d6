//! Plane-projective transform estimation from point correspondences.
//!
//! A direct linear transform solved through SVD, wrapped in RANSAC for
//! robustness against descriptor mismatches. The RANSAC sampler is seeded
//! so verification of a fixed match set is deterministic.

use nalgebra::{DMatrix, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// One correspondence: source point, destination point.
pub type PointPair = ((f64, f64), (f64, f64));

#[derive(Debug, Clone)]
pub struct RansacConfig {
    pub threshold: f64,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            max_iterations: 500,
            seed: 0x51ac,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HomographyResult {
    pub homography: Matrix3<f64>,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
}

/// Least-squares homography mapping `src` points onto `dst` points.
///
/// Needs at least 4 correspondences; returns `None` for degenerate
/// configurations (e.g. collinear points).
pub fn compute_homography(pairs: &[PointPair]) -> Option<Matrix3<f64>> {
    if pairs.len() < 4 {
        return None;
    }

    let mut a = DMatrix::<f64>::zeros(pairs.len() * 2, 9);
    for (i, &((x1, y1), (x2, y2))) in pairs.iter().enumerate() {
        let r = i * 2;
        a[(r, 0)] = -x1;
        a[(r, 1)] = -y1;
        a[(r, 2)] = -1.0;
        a[(r, 6)] = x2 * x1;
        a[(r, 7)] = x2 * y1;
        a[(r, 8)] = x2;

        a[(r + 1, 3)] = -x1;
        a[(r + 1, 4)] = -y1;
        a[(r + 1, 5)] = -1.0;
        a[(r + 1, 6)] = y2 * x1;
        a[(r + 1, 7)] = y2 * y1;
        a[(r + 1, 8)] = y2;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let h_vec = v_t.row(v_t.nrows() - 1);

    let mut h = Matrix3::new(
        h_vec[0], h_vec[1], h_vec[2], h_vec[3], h_vec[4], h_vec[5], h_vec[6], h_vec[7], h_vec[8],
    );

    if !h.iter().all(|v| v.is_finite()) || h[(2, 2)].abs() < 1e-12 {
        return None;
    }
    h /= h[(2, 2)];
    Some(h)
}

/// Symmetric-free forward reprojection error of one correspondence.
pub fn reprojection_error(h: &Matrix3<f64>, pair: &PointPair) -> f64 {
    let ((x1, y1), (x2, y2)) = *pair;
    let p = h * Vector3::new(x1, y1, 1.0);
    if p[2].abs() < 1e-12 {
        return f64::INFINITY;
    }
    let px = p[0] / p[2];
    let py = p[1] / p[2];
    ((px - x2).powi(2) + (py - y2).powi(2)).sqrt()
}

/// RANSAC homography estimation, followed by a least-squares refit on the
/// winning inlier set.
pub fn find_homography_ransac(
    pairs: &[PointPair],
    config: &RansacConfig,
) -> Option<HomographyResult> {
    let n = pairs.len();
    if n < 4 {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<usize> = (0..n).collect();

    let mut best_h: Option<Matrix3<f64>> = None;
    let mut best_inliers = vec![false; n];
    let mut best_count = 0usize;

    for _ in 0..config.max_iterations {
        indices.shuffle(&mut rng);
        let sample: Vec<PointPair> = indices[..4].iter().map(|&i| pairs[i]).collect();

        let Some(h) = compute_homography(&sample) else {
            continue;
        };

        let mut inliers = vec![false; n];
        let mut count = 0usize;
        for (j, pair) in pairs.iter().enumerate() {
            if reprojection_error(&h, pair) < config.threshold {
                inliers[j] = true;
                count += 1;
            }
        }

        if count > best_count {
            best_count = count;
            best_inliers = inliers;
            best_h = Some(h);
            if count == n {
                break;
            }
        }
    }

    let h = best_h?;
    if best_count < 4 {
        return None;
    }

    // Refit on all inliers for accuracy.
    let inlier_pairs: Vec<PointPair> = pairs
        .iter()
        .zip(best_inliers.iter())
        .filter(|(_, &keep)| keep)
        .map(|(p, _)| *p)
        .collect();
    let refined = compute_homography(&inlier_pairs).unwrap_or(h);

    Some(HomographyResult {
        homography: refined,
        inliers: best_inliers,
        num_inliers: best_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translated_pairs(dx: f64, dy: f64) -> Vec<PointPair> {
        let pts = [
            (10.0, 10.0),
            (120.0, 15.0),
            (20.0, 110.0),
            (130.0, 120.0),
            (60.0, 70.0),
            (90.0, 40.0),
        ];
        pts.iter()
            .map(|&(x, y)| ((x, y), (x + dx, y + dy)))
            .collect()
    }

    #[test]
    fn recovers_pure_translation() {
        let pairs = translated_pairs(25.0, -13.0);
        let h = compute_homography(&pairs).unwrap();
        assert!((h[(0, 2)] - 25.0).abs() < 1e-6);
        assert!((h[(1, 2)] + 13.0).abs() < 1e-6);
        assert!((h[(0, 0)] - 1.0).abs() < 1e-6);
        for pair in &pairs {
            assert!(reprojection_error(&h, pair) < 1e-6);
        }
    }

    #[test]
    fn ransac_discards_outliers() {
        let mut pairs = translated_pairs(5.0, 7.0);
        pairs.push(((0.0, 0.0), (500.0, 500.0)));
        pairs.push(((40.0, 40.0), (-300.0, 90.0)));

        let result = find_homography_ransac(&pairs, &RansacConfig::default()).unwrap();
        assert_eq!(result.num_inliers, pairs.len() - 2);
        assert!(!result.inliers[pairs.len() - 1]);
        assert!(!result.inliers[pairs.len() - 2]);
        assert!((result.homography[(0, 2)] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let pairs: Vec<PointPair> = (0..6)
            .map(|i| {
                let x = i as f64 * 10.0;
                ((x, 0.0), (x + 3.0, 0.0))
            })
            .collect();
        // All points on one line cannot fix a homography; RANSAC must not
        // fabricate a confident answer with spurious inlier support.
        let result = find_homography_ransac(&pairs, &RansacConfig::default());
        if let Some(r) = result {
            assert!(r.homography.iter().all(|v| v.is_finite()));
        }
    }
}
