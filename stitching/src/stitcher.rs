//! The multi-panorama orchestrator.
//!
//! One run: build the feature index over the whole batch, then repeatedly
//! cluster the remaining working set, solve and composite the winning
//! cluster, and put the rejected images back in play. Every input index
//! ends the run either consumed into exactly one panorama or discarded,
//! and the pairwise matrix is never recomputed between rounds.

use crate::blend::{Blender, MultiBandBlender};
use crate::cluster::cluster;
use crate::composite::{composite_cluster, CompositeConfig};
use crate::estimate::{median_focal, wave_correct_horizontal, CameraEstimator, HomographyBasedEstimator};
use crate::exposure::{ExposureCompensator, GainCompensator};
use crate::index::{BestOf2NearestMatcher, FeatureDetector, FeatureIndex, OrbDetector, PairwiseMatcher};
use crate::loader::{FsLoader, ImageLoader};
use crate::seam::{SeamFinder, VoronoiSeamFinder};
use crate::warp::{RotationWarper, SphericalWarper, WarpedImage};
use image::RgbImage;
use nalgebra::Matrix3;
use pano_core::{Error, Result};
use pano_features::{ImageFeatures, MatchesInfo};
use std::path::Path;

/// One stitched output and the original indices it consumed.
pub struct Panorama {
    pub image: RgbImage,
    /// `panorama<N>.jpg`, numbered from 1 in production order.
    pub name: String,
    /// Original batch indices, ascending.
    pub sources: Vec<usize>,
}

/// Outcome of a full run. `consumed` and `discarded` partition the batch.
pub struct StitchOutcome {
    pub panoramas: Vec<Panorama>,
    /// Original indices that ended up inside some panorama, ascending.
    pub consumed: Vec<usize>,
    /// Original indices no panorama could use, ascending.
    pub discarded: Vec<usize>,
    pub batch_size: usize,
}

impl StitchOutcome {
    /// Write every panorama into `dir` under its own name.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        for pano in &self.panoramas {
            let path = dir.join(&pano.name);
            pano.image.save(&path).map_err(|source| Error::Encode {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Batch stitcher with swappable stage capabilities.
///
/// Defaults reproduce the full pipeline; tests swap individual stages for
/// scripted ones to drive the orchestration deterministically.
pub struct Stitcher {
    loader: Box<dyn ImageLoader>,
    detector: Box<dyn FeatureDetector>,
    matcher: Box<dyn PairwiseMatcher>,
    estimator: Box<dyn CameraEstimator>,
    warper: Box<dyn RotationWarper>,
    compensator: Box<dyn ExposureCompensator>,
    seam_finder: Box<dyn SeamFinder>,
    blender: Box<dyn Blender>,
    confidence_threshold: f64,
    composite_config: CompositeConfig,
}

impl Default for Stitcher {
    fn default() -> Self {
        Self {
            loader: Box::new(FsLoader),
            detector: Box::new(OrbDetector::default()),
            matcher: Box::new(BestOf2NearestMatcher),
            estimator: Box::new(HomographyBasedEstimator::default()),
            warper: Box::new(SphericalWarper::default()),
            compensator: Box::new(GainCompensator::default()),
            seam_finder: Box::new(VoronoiSeamFinder),
            blender: Box::new(MultiBandBlender::default()),
            confidence_threshold: 1.0,
            composite_config: CompositeConfig::default(),
        }
    }
}

impl Stitcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader(mut self, loader: Box<dyn ImageLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn FeatureDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_matcher(mut self, matcher: Box<dyn PairwiseMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_estimator(mut self, estimator: Box<dyn CameraEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_warper(mut self, warper: Box<dyn RotationWarper>) -> Self {
        self.warper = warper;
        self
    }

    pub fn with_compensator(mut self, compensator: Box<dyn ExposureCompensator>) -> Self {
        self.compensator = compensator;
        self
    }

    pub fn with_seam_finder(mut self, seam_finder: Box<dyn SeamFinder>) -> Self {
        self.seam_finder = seam_finder;
        self
    }

    pub fn with_blender(mut self, blender: Box<dyn Blender>) -> Self {
        self.blender = blender;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_blend_strength(mut self, strength: f64) -> Self {
        self.composite_config.blend_strength = strength;
        self
    }

    /// Run the full batch. Zero panoramas is a success: it means no subset
    /// of the inputs overlapped well enough, not that the run failed.
    ///
    /// After `Loading` and `Matching` (the one-time feature index build),
    /// the machine cycles `Clustering -> Estimating -> Compositing` until
    /// the working set is exhausted. Every original index leaves the run
    /// through exactly one of `consumed` or `discarded`.
    pub fn stitch(&mut self, paths: &[String]) -> Result<StitchOutcome> {
        // Loading and Matching. A decode failure aborts here with no
        // partial output.
        let index = FeatureIndex::build(
            self.loader.as_ref(),
            self.detector.as_ref(),
            self.matcher.as_ref(),
            paths,
        )?;

        let mut consumed = Vec::new();
        let mut discarded = Vec::new();
        let mut panoramas = Vec::new();

        let mut state = State::Clustering {
            working: (0..index.len()).collect(),
        };
        loop {
            state = match state {
                State::Clustering { mut working } => {
                    if working.len() < 2 {
                        log::info!("{} image(s) left over, discarding", working.len());
                        discarded.extend(working.drain(..));
                        State::Done
                    } else {
                        self.advance_clustering(&index, working, &mut discarded)
                    }
                }
                State::Estimating { selected, rejected } => {
                    match self.solve_cluster(&index, &selected) {
                        Ok(warped) => State::Compositing {
                            selected,
                            rejected,
                            warped,
                        },
                        // Policy: a degenerate cluster is dropped from all
                        // future rounds and the run continues with the
                        // rejected images.
                        Err(Error::GeometryDegenerate(reason))
                        | Err(Error::Algorithm(reason)) => {
                            log::warn!("discarding cluster {selected:?}: {reason}");
                            discarded.extend(selected);
                            State::Clustering { working: rejected }
                        }
                        Err(e) => return Err(e),
                    }
                }
                State::Compositing {
                    selected,
                    rejected,
                    warped,
                } => {
                    let composited = composite_cluster(
                        warped,
                        self.compensator.as_mut(),
                        self.seam_finder.as_ref(),
                        self.blender.as_mut(),
                        &self.composite_config,
                    );
                    match composited {
                        Ok(image) => {
                            let name = format!("panorama{}.jpg", panoramas.len() + 1);
                            log::info!("composited {name} from images {selected:?}");
                            panoramas.push(Panorama {
                                image,
                                name,
                                sources: selected.clone(),
                            });
                            consumed.extend(selected);
                            State::Clustering { working: rejected }
                        }
                        Err(Error::Algorithm(reason)) => {
                            log::warn!("discarding cluster {selected:?}: {reason}");
                            discarded.extend(selected);
                            State::Clustering { working: rejected }
                        }
                        Err(e) => return Err(e),
                    }
                }
                State::Done => break,
            };
        }

        consumed.sort_unstable();
        discarded.sort_unstable();
        Ok(StitchOutcome {
            panoramas,
            consumed,
            discarded,
            batch_size: index.len(),
        })
    }

    /// `Clustering` transition: pick this round's cluster or finish.
    fn advance_clustering(
        &self,
        index: &FeatureIndex,
        mut working: Vec<usize>,
        discarded: &mut Vec<usize>,
    ) -> State {
        let clustering = cluster(
            working.len(),
            |p, q| index.confidence(working[p], working[q]),
            self.confidence_threshold,
        );
        match clustering {
            Ok((selected_pos, rejected_pos)) => {
                // Translate working-set positions back to original indices.
                let selected: Vec<usize> = selected_pos.iter().map(|&p| working[p]).collect();
                let rejected: Vec<usize> = rejected_pos.iter().map(|&p| working[p]).collect();
                log::info!(
                    "round: cluster of {} from {} working images",
                    selected.len(),
                    working.len()
                );
                State::Estimating { selected, rejected }
            }
            Err(Error::NoViableCluster) => {
                log::info!(
                    "no cluster above confidence {}, discarding {} image(s)",
                    self.confidence_threshold,
                    working.len()
                );
                discarded.extend(working.drain(..));
                State::Done
            }
            // cluster() has no other failure mode; a new one must be
            // wired into the state machine, not dropped here.
            Err(err) => unreachable!("clustering failed unexpectedly: {err}"),
        }
    }

    /// `Estimating` body: cameras, wave correction, and per-image warps
    /// for one cluster of original indices.
    fn solve_cluster(
        &mut self,
        index: &FeatureIndex,
        selected: &[usize],
    ) -> Result<Vec<WarpedImage>> {
        let (features, matches) = subset(index, selected);
        let mut cameras = self.estimator.estimate(&features, &matches)?;

        let scale = median_focal(&cameras);
        let mut rotations: Vec<Matrix3<f64>> = cameras.iter().map(|c| c.rotation).collect();
        wave_correct_horizontal(&mut rotations);
        for (camera, rotation) in cameras.iter_mut().zip(rotations) {
            camera.rotation = rotation;
        }

        selected
            .iter()
            .zip(cameras.iter())
            .map(|(&orig, camera)| self.warper.warp(&index.images[orig], camera, scale))
            .collect()
    }
}

/// Orchestrator round states. `Loading` and `Matching` precede the loop;
/// the index build stands in for both.
enum State {
    /// Pick the next cluster from the remaining working set.
    Clustering { working: Vec<usize> },
    /// Solve geometry and warp this round's cluster. `rejected` is the
    /// candidate next working set, already in original index space.
    Estimating {
        selected: Vec<usize>,
        rejected: Vec<usize>,
    },
    /// Blend the warped cluster into one panorama.
    Compositing {
        selected: Vec<usize>,
        rejected: Vec<usize>,
        warped: Vec<WarpedImage>,
    },
    Done,
}

/// Re-index a cluster's features and match matrix into cluster position
/// space: position `p` stands for original index `selected[p]`.
fn subset(index: &FeatureIndex, selected: &[usize]) -> (Vec<ImageFeatures>, Vec<MatchesInfo>) {
    let k = selected.len();

    let features: Vec<ImageFeatures> = selected
        .iter()
        .enumerate()
        .map(|(pos, &orig)| {
            let mut f = index.features[orig].clone();
            f.img_idx = pos;
            f
        })
        .collect();

    let mut matches = Vec::with_capacity(k * k);
    for (a, &orig_a) in selected.iter().enumerate() {
        for (b, &orig_b) in selected.iter().enumerate() {
            let mut info = index.match_at(orig_a, orig_b).clone();
            info.src_idx = a;
            info.dst_idx = b;
            matches.push(info);
        }
    }
    (features, matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_reindexes_features_and_matrix() {
        use crate::index::{BestOf2NearestMatcher, OrbDetector, PairwiseMatcher};
        use crate::loader::{ImageLoader, MemoryLoader};
        use crate::index::FeatureDetector;

        let mut loader = MemoryLoader::new();
        for i in 0..4u8 {
            loader.insert(
                format!("{i}.png"),
                RgbImage::from_pixel(16, 16, image::Rgb([i * 40; 3])),
            );
        }
        let images: Vec<RgbImage> = (0..4)
            .map(|i| loader.load(&format!("{i}.png")).unwrap())
            .collect();
        let detector = OrbDetector::default();
        let features: Vec<_> = images
            .iter()
            .enumerate()
            .map(|(i, img)| detector.detect(img, i).unwrap())
            .collect();
        let matches = BestOf2NearestMatcher.match_features(&features).unwrap();
        let index = FeatureIndex {
            images,
            features,
            matches,
        };

        let (features, matrix) = subset(&index, &[1, 3]);
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].img_idx, 0);
        assert_eq!(features[1].img_idx, 1);
        assert_eq!(matrix.len(), 4);
        assert_eq!(matrix[1].src_idx, 0);
        assert_eq!(matrix[1].dst_idx, 1);
        assert_eq!(matrix[2].src_idx, 1);
        assert_eq!(matrix[2].dst_idx, 0);
    }
}
