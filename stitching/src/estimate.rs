//! Camera geometry for one cluster: focal initialization from pairwise
//! homographies, rotation propagation over a confidence spanning structure,
//! a relaxation pass over the cluster's matches, and horizontal wave
//! correction. All inputs are the round's re-indexed subset; the full batch
//! matrix never enters this stage.

use nalgebra::{Matrix3, UnitQuaternion, Vector3, SVD};
use pano_core::{CameraParams, Error, Result};
use pano_features::{ImageFeatures, MatchesInfo};
use std::collections::VecDeque;

/// Estimates per-image cameras for a matched cluster.
///
/// `matches` is the cluster's re-indexed `k * k` pair matrix. Fails with
/// `Error::GeometryDegenerate` when the cluster's verified pairs cannot pin
/// down a consistent rotation set.
pub trait CameraEstimator {
    fn estimate(
        &self,
        features: &[ImageFeatures],
        matches: &[MatchesInfo],
    ) -> Result<Vec<CameraParams>>;
}

/// Homography-based initial estimation refined by rotation relaxation over
/// the cluster's verified pairs.
pub struct HomographyBasedEstimator {
    pub refine_sweeps: usize,
}

impl Default for HomographyBasedEstimator {
    fn default() -> Self {
        Self { refine_sweeps: 10 }
    }
}

impl CameraEstimator for HomographyBasedEstimator {
    fn estimate(
        &self,
        features: &[ImageFeatures],
        matches: &[MatchesInfo],
    ) -> Result<Vec<CameraParams>> {
        let k = features.len();
        if k < 2 {
            return Err(Error::GeometryDegenerate(format!(
                "cluster of {k} images cannot fix camera geometry"
            )));
        }
        debug_assert_eq!(matches.len(), k * k);

        let focal = estimate_focal(features, matches);
        let mut cameras: Vec<CameraParams> = features
            .iter()
            .map(|f| CameraParams::new(focal, f.width as f64 / 2.0, f.height as f64 / 2.0))
            .collect();

        // Verified pair edges in cluster position space, deduplicated to
        // the forward (low, high) direction.
        let edges = verified_edges(matches, k);
        if edges.is_empty() {
            return Err(Error::GeometryDegenerate(
                "no verified pairs inside cluster".to_string(),
            ));
        }

        let rotations = propagate_rotations(features, matches, k, focal, &edges)?;
        for (cam, r) in cameras.iter_mut().zip(rotations.into_iter()) {
            cam.rotation = r;
        }

        self.refine(features, matches, &mut cameras, &edges)?;

        if cameras
            .iter()
            .any(|c| !c.rotation.iter().all(|v| v.is_finite()) || !c.focal.is_finite())
        {
            return Err(Error::GeometryDegenerate(
                "non-finite camera parameters after refinement".to_string(),
            ));
        }
        Ok(cameras)
    }
}

impl HomographyBasedEstimator {
    /// Relaxation sweeps: each camera's rotation is re-averaged against the
    /// rotations its verified neighbors imply, with the first camera held
    /// fixed as the gauge. Restricted to the cluster's own matches, so cost
    /// is bounded by cluster size.
    fn refine(
        &self,
        features: &[ImageFeatures],
        matches: &[MatchesInfo],
        cameras: &mut [CameraParams],
        edges: &[(usize, usize)],
    ) -> Result<()> {
        let k = cameras.len();
        for _ in 0..self.refine_sweeps {
            let mut max_delta = 0.0f64;
            let focal = cameras[0].focal;
            for v in 1..k {
                let current = UnitQuaternion::from_matrix(&cameras[v].rotation);
                let mut quats: Vec<UnitQuaternion<f64>> = vec![current];

                for &(a, b) in edges {
                    let (u, rel) = if b == v {
                        let Some(rel) = relative_rotation(features, matches, a, b, k, focal) else {
                            continue;
                        };
                        (a, rel)
                    } else if a == v {
                        let Some(rel) = relative_rotation(features, matches, a, b, k, focal) else {
                            continue;
                        };
                        (b, rel.transpose())
                    } else {
                        continue;
                    };
                    // d_world = R_u d_u, d_v = rel * d_u  =>  R_v = R_u rel^T
                    let implied = cameras[u].rotation * rel.transpose();
                    quats.push(UnitQuaternion::from_matrix(&implied));
                }

                let averaged = average_quaternions(&quats);
                let delta = current.angle_to(&averaged);
                max_delta = max_delta.max(delta);
                cameras[v].rotation = averaged.to_rotation_matrix().into_inner();
            }
            if max_delta < 1e-9 {
                break;
            }
            if !max_delta.is_finite() {
                return Err(Error::GeometryDegenerate(
                    "rotation relaxation diverged".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn verified_edges(matches: &[MatchesInfo], k: usize) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    for i in 0..k {
        for j in i + 1..k {
            if matches[i * k + j].homography.is_some() {
                edges.push((i, j));
            }
        }
    }
    edges
}

/// Centered-coordinate relative rotation implied by the verified pair
/// (u, v): maps camera-u ray directions onto camera-v ray directions.
fn relative_rotation(
    features: &[ImageFeatures],
    matches: &[MatchesInfo],
    u: usize,
    v: usize,
    k: usize,
    focal: f64,
) -> Option<Matrix3<f64>> {
    let info = &matches[u * k + v];
    let h = info.homography.as_ref()?;
    let h_centered = center_homography(h, &features[u], &features[v]);
    let kmat = centered_k(focal);
    let m = kmat.try_inverse()? * h_centered * kmat;
    nearest_rotation(&m)
}

fn centered_k(focal: f64) -> Matrix3<f64> {
    Matrix3::new(focal, 0.0, 0.0, 0.0, focal, 0.0, 0.0, 0.0, 1.0)
}

/// Re-express a raw-pixel homography in coordinates centered on each
/// image's principal point.
fn center_homography(
    h: &Matrix3<f64>,
    src: &ImageFeatures,
    dst: &ImageFeatures,
) -> Matrix3<f64> {
    let t_src = translation(src.width as f64 / 2.0, src.height as f64 / 2.0);
    let t_dst = translation(-(dst.width as f64) / 2.0, -(dst.height as f64) / 2.0);
    t_dst * h * t_src
}

fn translation(dx: f64, dy: f64) -> Matrix3<f64> {
    Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0)
}

/// BFS rotation propagation from cluster position 0 over verified edges.
fn propagate_rotations(
    features: &[ImageFeatures],
    matches: &[MatchesInfo],
    k: usize,
    focal: f64,
    edges: &[(usize, usize)],
) -> Result<Vec<Matrix3<f64>>> {
    let mut adjacency = vec![Vec::new(); k];
    for &(a, b) in edges {
        adjacency[a].push(b);
        adjacency[b].push(a);
    }

    let kmat = centered_k(focal);
    let kmat_inv = kmat.try_inverse().ok_or_else(|| {
        Error::GeometryDegenerate(format!("singular intrinsics for focal {focal}"))
    })?;

    let mut rotations = vec![None::<Matrix3<f64>>; k];
    rotations[0] = Some(Matrix3::identity());
    let mut queue = VecDeque::from([0usize]);

    while let Some(u) = queue.pop_front() {
        let r_u = rotations[u].ok_or_else(|| {
            Error::GeometryDegenerate("rotation propagation visited an unset node".to_string())
        })?;
        for &v in &adjacency[u] {
            if rotations[v].is_some() {
                continue;
            }
            // Forward entry (u, v) maps u pixels to v pixels.
            let info = &matches[u * k + v];
            let h = info.homography.as_ref().ok_or_else(|| {
                Error::GeometryDegenerate(format!("missing homography for pair ({u}, {v})"))
            })?;
            let h_centered = center_homography(h, &features[u], &features[v]);
            let m = kmat_inv * h_centered * kmat;
            let rel = nearest_rotation(&m).ok_or_else(|| {
                Error::GeometryDegenerate(format!("degenerate homography for pair ({u}, {v})"))
            })?;
            rotations[v] = Some(r_u * rel.transpose());
            queue.push_back(v);
        }
    }

    rotations
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            r.ok_or_else(|| {
                Error::GeometryDegenerate(format!(
                    "cluster position {i} is not connected by verified pairs"
                ))
            })
        })
        .collect()
}

/// Closest rotation matrix to an arbitrary 3x3, via SVD polar decomposition.
fn nearest_rotation(m: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    if !m.iter().all(|v| v.is_finite()) {
        return None;
    }
    let svd = SVD::new(*m, true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.column_mut(2).neg_mut();
        r = u_fixed * v_t;
    }
    if r.iter().all(|v| v.is_finite()) {
        Some(r)
    } else {
        None
    }
}

fn average_quaternions(quats: &[UnitQuaternion<f64>]) -> UnitQuaternion<f64> {
    let reference = quats[0];
    let mut acc = nalgebra::Vector4::zeros();
    for q in quats {
        let mut coords = q.coords;
        if reference.coords.dot(&coords) < 0.0 {
            coords = -coords;
        }
        acc += coords;
    }
    UnitQuaternion::from_quaternion(nalgebra::Quaternion::from(acc / quats.len() as f64))
}

/// Shared focal estimate for the cluster: median over per-pair estimates
/// decomposed from the verified homographies, with an image-size fallback
/// when no pair yields a usable estimate.
pub fn estimate_focal(features: &[ImageFeatures], matches: &[MatchesInfo]) -> f64 {
    let k = features.len();
    let mut all_focals = Vec::new();

    for i in 0..k {
        for j in 0..k {
            let info = &matches[i * k + j];
            let Some(h) = info.homography.as_ref() else {
                continue;
            };
            let h_centered = center_homography(h, &features[i], &features[j]);
            if let (Some(f0), Some(f1)) = focals_from_homography(&h_centered) {
                all_focals.push((f0 * f1).sqrt());
            }
        }
    }

    if all_focals.is_empty() {
        let sum: f64 = features
            .iter()
            .map(|f| (f.width + f.height) as f64)
            .sum();
        return sum / features.len() as f64;
    }
    median(&mut all_focals)
}

/// Focal lengths of the two cameras related by a centered-coordinate
/// homography, when the decomposition is well-posed.
pub fn focals_from_homography(h: &Matrix3<f64>) -> (Option<f64>, Option<f64>) {
    const EPS: f64 = 1e-9;
    let h = [
        h[(0, 0)],
        h[(0, 1)],
        h[(0, 2)],
        h[(1, 0)],
        h[(1, 1)],
        h[(1, 2)],
        h[(2, 0)],
        h[(2, 1)],
        h[(2, 2)],
    ];

    // Focal of the destination camera.
    let mut f1 = None;
    let d1 = h[6] * h[7];
    let d2 = (h[7] - h[6]) * (h[7] + h[6]);
    let v1 = if d1.abs() > EPS {
        Some(-(h[0] * h[1] + h[3] * h[4]) / d1)
    } else {
        None
    };
    let v2 = if d2.abs() > EPS {
        Some((h[0] * h[0] + h[3] * h[3] - h[1] * h[1] - h[4] * h[4]) / d2)
    } else {
        None
    };
    match (v1, v2) {
        (Some(a), Some(b)) => {
            let (hi, lo) = if a > b { (a, b) } else { (b, a) };
            if hi > 0.0 && lo > 0.0 {
                f1 = Some((if d1.abs() > d2.abs() { hi } else { lo }).sqrt());
            } else if hi > 0.0 {
                f1 = Some(hi.sqrt());
            }
        }
        (Some(a), None) | (None, Some(a)) => {
            if a > 0.0 {
                f1 = Some(a.sqrt());
            }
        }
        (None, None) => {}
    }

    // Focal of the source camera.
    let mut f0 = None;
    let d1 = h[0] * h[3] + h[1] * h[4];
    let d2 = h[0] * h[0] + h[1] * h[1] - h[3] * h[3] - h[4] * h[4];
    let v1 = if d1.abs() > EPS {
        Some(-h[2] * h[5] / d1)
    } else {
        None
    };
    let v2 = if d2.abs() > EPS {
        Some((h[5] * h[5] - h[2] * h[2]) / d2)
    } else {
        None
    };
    match (v1, v2) {
        (Some(a), Some(b)) => {
            let (hi, lo) = if a > b { (a, b) } else { (b, a) };
            if hi > 0.0 && lo > 0.0 {
                f0 = Some((if d1.abs() > d2.abs() { hi } else { lo }).sqrt());
            } else if hi > 0.0 {
                f0 = Some(hi.sqrt());
            }
        }
        (Some(a), None) | (None, Some(a)) => {
            if a > 0.0 {
                f0 = Some(a.sqrt());
            }
        }
        (None, None) => {}
    }

    (f0, f1)
}

/// Warp scale for a cluster: exact median focal; for an even count, the
/// mean of the two central values.
pub fn median_focal(cameras: &[CameraParams]) -> f64 {
    let mut focals: Vec<f64> = cameras.iter().map(|c| c.focal).collect();
    median(&mut focals)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Horizontal wave correction: jointly rotates all cluster cameras so the
/// panorama's horizon stays level instead of accumulating tilt drift.
pub fn wave_correct_horizontal(rmats: &mut [Matrix3<f64>]) {
    if rmats.len() < 2 {
        return;
    }

    let mut moment = Matrix3::zeros();
    for r in rmats.iter() {
        let c0 = r.column(0).into_owned();
        moment += c0 * c0.transpose();
    }
    let eig = nalgebra::SymmetricEigen::new(moment);
    let mut smallest = 0;
    for i in 1..3 {
        if eig.eigenvalues[i] < eig.eigenvalues[smallest] {
            smallest = i;
        }
    }
    let mut rg1: Vector3<f64> = eig.eigenvectors.column(smallest).into_owned();

    let mut img_k = Vector3::zeros();
    for r in rmats.iter() {
        img_k += r.column(2).into_owned();
    }
    let mut rg0 = rg1.cross(&img_k);
    let norm = rg0.norm();
    if norm < 1e-9 {
        // Cameras share (or oppose) the vertical; nothing to level.
        return;
    }
    rg0 /= norm;

    let mut conf = 0.0;
    for r in rmats.iter() {
        conf += rg0.dot(&r.column(0).into_owned());
    }
    if conf < 0.0 {
        rg0 = -rg0;
        rg1 = -rg1;
    }
    let rg2 = rg0.cross(&rg1);

    let correction = Matrix3::from_rows(&[rg0.transpose(), rg1.transpose(), rg2.transpose()]);
    for r in rmats.iter_mut() {
        *r = correction * *r;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pano_core::KeyPoints;
    use pano_features::Descriptors;

    fn feats(idx: usize, width: u32, height: u32) -> ImageFeatures {
        ImageFeatures {
            img_idx: idx,
            width,
            height,
            keypoints: KeyPoints::new(),
            descriptors: Descriptors::new(),
        }
    }

    fn cam(focal: f64) -> CameraParams {
        CameraParams::new(focal, 0.0, 0.0)
    }

    #[test]
    fn median_focal_odd_is_exact_median() {
        let cams = [cam(900.0), cam(700.0), cam(1100.0)];
        assert_eq!(median_focal(&cams), 900.0);
    }

    #[test]
    fn median_focal_even_is_mean_of_middle_two() {
        let cams = [cam(1000.0), cam(600.0), cam(800.0), cam(1200.0)];
        assert_eq!(median_focal(&cams), 900.0);
    }

    #[test]
    fn focals_recovered_from_synthetic_rotation_homography() {
        let focal = 850.0;
        let k = centered_k(focal);
        let r = nalgebra::Rotation3::from_axis_angle(&Vector3::y_axis(), 0.12).into_inner();
        let h = k * r * k.try_inverse().unwrap();

        let (f0, f1) = focals_from_homography(&h);
        let f0 = f0.expect("source focal");
        let f1 = f1.expect("destination focal");
        assert!((f0 - focal).abs() < 1.0, "f0 = {f0}");
        assert!((f1 - focal).abs() < 1.0, "f1 = {f1}");
    }

    #[test]
    fn wave_correct_preserves_orthonormality_and_relative_angles() {
        let mut rmats: Vec<Matrix3<f64>> = [0.3f64, 0.0, -0.25, 0.6]
            .iter()
            .map(|&a| {
                (nalgebra::Rotation3::from_axis_angle(&Vector3::y_axis(), a)
                    * nalgebra::Rotation3::from_axis_angle(&Vector3::x_axis(), 0.05))
                .into_inner()
            })
            .collect();
        let before = rmats.clone();

        wave_correct_horizontal(&mut rmats);

        for r in &rmats {
            assert!(((r * r.transpose()) - Matrix3::identity()).norm() < 1e-9);
            assert!((r.determinant() - 1.0).abs() < 1e-9);
        }
        // A joint left-rotation preserves every pairwise rotation angle.
        for i in 0..rmats.len() {
            for j in i + 1..rmats.len() {
                let t_before = (before[i] * before[j].transpose()).trace();
                let t_after = (rmats[i] * rmats[j].transpose()).trace();
                assert!((t_before - t_after).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn estimator_recovers_relative_rotation_for_synthetic_pair() {
        let (width, height) = (640u32, 480u32);
        let focal = width as f64 + height as f64;
        let angle = 0.1;

        let k = centered_k(focal);
        let rel = nalgebra::Rotation3::from_axis_angle(&Vector3::y_axis(), angle).into_inner();
        let h_centered = k * rel * k.try_inverse().unwrap();
        // Undo the centering the estimator will apply.
        let t = translation(-(width as f64) / 2.0, -(height as f64) / 2.0);
        let h_raw = t.try_inverse().unwrap() * h_centered * t;

        let features = vec![feats(0, width, height), feats(1, width, height)];
        let mut matches: Vec<MatchesInfo> = (0..4)
            .map(|idx| MatchesInfo::empty(idx / 2, idx % 2))
            .collect();
        matches[1].homography = Some(h_raw);
        matches[1].num_inliers = 30;
        matches[1].confidence = 2.0;
        matches[2].homography = h_raw.try_inverse();
        matches[2].num_inliers = 30;
        matches[2].confidence = 2.0;

        let cameras = HomographyBasedEstimator::default()
            .estimate(&features, &matches)
            .unwrap();
        assert_eq!(cameras.len(), 2);

        let rel_est = cameras[1].rotation.transpose() * cameras[0].rotation;
        let cos_angle = ((rel_est.trace() - 1.0) / 2.0).clamp(-1.0, 1.0);
        assert!(
            (cos_angle.acos() - angle).abs() < 0.02,
            "recovered angle {}",
            cos_angle.acos()
        );
    }

    #[test]
    fn disconnected_cluster_is_degenerate() {
        let features = vec![feats(0, 64, 48), feats(1, 64, 48), feats(2, 64, 48)];
        let mut matches: Vec<MatchesInfo> = (0..9)
            .map(|idx| MatchesInfo::empty(idx / 3, idx % 3))
            .collect();
        // Only 0-1 verified; position 2 is unreachable.
        matches[1].homography = Some(Matrix3::identity());
        matches[3].homography = Some(Matrix3::identity());

        let result = HomographyBasedEstimator::default().estimate(&features, &matches);
        assert!(matches!(result, Err(Error::GeometryDegenerate(_))));
    }
}
