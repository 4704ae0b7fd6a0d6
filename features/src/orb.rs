//! ORB-style detector: multi-scale FAST keypoints with intensity-centroid
//! orientation and a steered 256-bit binary descriptor.

use crate::descriptor::{Descriptor, DescriptorExtractor, Descriptors};
use crate::fast::fast_detect;
use image::GrayImage;
use pano_core::{KeyPoint, KeyPoints};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seed for the sampling pattern. Fixed so the same input always produces
/// the same descriptors, which keeps clustering deterministic run to run.
const PATTERN_SEED: u64 = 0x9e37_79b9;

pub struct Orb {
    n_features: usize,
    scale_factor: f32,
    n_levels: usize,
    patch_size: i32,
    fast_threshold: u8,
    pattern: Vec<(f32, f32, f32, f32)>,
}

impl Default for Orb {
    fn default() -> Self {
        let patch_size = 31;
        Self {
            n_features: 500,
            scale_factor: 1.2,
            n_levels: 8,
            patch_size,
            fast_threshold: 20,
            pattern: sampling_pattern(patch_size),
        }
    }
}

impl Orb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_features(mut self, n: usize) -> Self {
        self.n_features = n;
        self
    }

    pub fn with_n_levels(mut self, n: usize) -> Self {
        self.n_levels = n;
        self
    }

    pub fn with_fast_threshold(mut self, threshold: u8) -> Self {
        self.fast_threshold = threshold;
        self
    }

    /// Detect keypoints with FAST across the scale pyramid.
    pub fn detect(&self, image: &GrayImage) -> KeyPoints {
        let mut all_keypoints = Vec::new();
        let mut scale = 1.0f32;

        for level in 0..self.n_levels {
            let scaled = if level == 0 {
                image.clone()
            } else {
                downscale(image, scale)
            };
            if scaled.width() < 8 || scaled.height() < 8 {
                break;
            }

            let kps = fast_detect(&scaled, self.fast_threshold, self.n_features * 2);
            for kp in kps.keypoints {
                all_keypoints.push(
                    KeyPoint::new(kp.x * scale as f64, kp.y * scale as f64)
                        .with_size(self.patch_size as f64 * scale as f64)
                        .with_octave(level as i32)
                        .with_response(kp.response),
                );
            }

            scale *= self.scale_factor;
        }

        all_keypoints.sort_by(|a, b| {
            b.response
                .partial_cmp(&a.response)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all_keypoints.truncate(self.n_features);

        KeyPoints {
            keypoints: all_keypoints,
        }
    }

    /// Assign orientations from the patch intensity centroid.
    pub fn compute_orientations(&self, image: &GrayImage, keypoints: &mut KeyPoints) {
        let half_patch = self.patch_size / 2;

        for kp in &mut keypoints.keypoints {
            let x = kp.x as i32;
            let y = kp.y as i32;

            let mut m01 = 0.0f64;
            let mut m10 = 0.0f64;

            for dy in -half_patch..half_patch {
                for dx in -half_patch..half_patch {
                    let px = x + dx;
                    let py = y + dy;
                    if px >= 0
                        && px < image.width() as i32
                        && py >= 0
                        && py < image.height() as i32
                    {
                        let intensity = image.get_pixel(px as u32, py as u32)[0] as f64;
                        m01 += intensity * dy as f64;
                        m10 += intensity * dx as f64;
                    }
                }
            }

            kp.angle = m01.atan2(m10).to_degrees();
        }
    }
}

impl DescriptorExtractor for Orb {
    fn extract(&self, image: &GrayImage, keypoints: &KeyPoints) -> Descriptors {
        let mut descriptors = Descriptors::with_capacity(keypoints.len());
        for kp in keypoints.iter() {
            if let Some(desc) = steered_descriptor(image, kp, &self.pattern, self.patch_size) {
                descriptors.push(desc);
            }
        }
        descriptors
    }
}

/// Detect, orient and describe in one call, keeping at most `n_features`.
pub fn orb_detect_and_compute(image: &GrayImage, n_features: usize) -> (KeyPoints, Descriptors) {
    let orb = Orb::new().with_n_features(n_features);
    let mut keypoints = orb.detect(image);
    orb.compute_orientations(image, &mut keypoints);
    let descriptors = orb.extract(image, &keypoints);
    (keypoints, descriptors)
}

fn sampling_pattern(patch_size: i32) -> Vec<(f32, f32, f32, f32)> {
    let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
    let half = patch_size as f32 / 2.0;
    (0..256)
        .map(|_| {
            (
                rng.gen_range(-half..half),
                rng.gen_range(-half..half),
                rng.gen_range(-half..half),
                rng.gen_range(-half..half),
            )
        })
        .collect()
}

fn steered_descriptor(
    image: &GrayImage,
    kp: &KeyPoint,
    pattern: &[(f32, f32, f32, f32)],
    patch_size: i32,
) -> Option<Descriptor> {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let cx = kp.x as i32;
    let cy = kp.y as i32;

    let half_patch = patch_size / 2;
    if cx < half_patch || cx >= width - half_patch || cy < half_patch || cy >= height - half_patch
    {
        return None;
    }

    let angle_rad = kp.angle.to_radians();
    let cos_a = angle_rad.cos() as f32;
    let sin_a = angle_rad.sin() as f32;

    let mut data = vec![0u8; 32];
    for (bit, &(x1, y1, x2, y2)) in pattern.iter().enumerate() {
        let rx1 = cos_a * x1 - sin_a * y1;
        let ry1 = sin_a * x1 + cos_a * y1;
        let rx2 = cos_a * x2 - sin_a * y2;
        let ry2 = sin_a * x2 + cos_a * y2;

        let px1 = (cx as f32 + rx1) as i32;
        let py1 = (cy as f32 + ry1) as i32;
        let px2 = (cx as f32 + rx2) as i32;
        let py2 = (cy as f32 + ry2) as i32;

        if px1 < 0
            || px1 >= width
            || py1 < 0
            || py1 >= height
            || px2 < 0
            || px2 >= width
            || py2 < 0
            || py2 >= height
        {
            continue;
        }

        let val1 = image.get_pixel(px1 as u32, py1 as u32)[0];
        let val2 = image.get_pixel(px2 as u32, py2 as u32)[0];
        if val1 < val2 {
            data[bit / 8] |= 1 << (7 - bit % 8);
        }
    }

    Some(Descriptor::new(data, *kp))
}

fn downscale(image: &GrayImage, scale: f32) -> GrayImage {
    let new_width = ((image.width() as f32 / scale) as u32).max(1);
    let new_height = ((image.height() as f32 / scale) as u32).max(1);
    image::imageops::resize(
        image,
        new_width,
        new_height,
        image::imageops::FilterType::Triangle,
    )
}
