//! Exposure compensation across a warped cluster.
//!
//! Single-scalar gain per image, solved jointly from pairwise overlap
//! statistics so neighboring patches agree in brightness before seams and
//! blending. No overlap means the system degrades to unit gains.

use image::{GrayImage, RgbImage};
use nalgebra::{DMatrix, DVector};
use pano_core::{Error, Point, Rect, Result};

/// Computes and applies per-image exposure corrections.
pub trait ExposureCompensator {
    /// Derive corrections from the warped patches and their placement.
    fn feed(
        &mut self,
        corners: &[Point],
        images: &[RgbImage],
        masks: &[GrayImage],
    ) -> Result<()>;

    /// Apply the correction for image `idx` in place. `corner` and `mask`
    /// give the patch placement for compensators that correct per region; a
    /// global-gain compensator ignores them.
    fn apply(&self, idx: usize, corner: Point, image: &mut RgbImage, mask: &GrayImage);
}

/// No-op compensator.
#[derive(Default)]
pub struct NoExposureCompensator;

impl ExposureCompensator for NoExposureCompensator {
    fn feed(&mut self, _: &[Point], _: &[RgbImage], _: &[GrayImage]) -> Result<()> {
        Ok(())
    }

    fn apply(&self, _idx: usize, _corner: Point, _image: &mut RgbImage, _mask: &GrayImage) {}
}

/// Joint least-squares gain compensation over all pairwise overlaps.
pub struct GainCompensator {
    gains: Vec<f64>,
    /// Weight of the brightness-agreement term.
    alpha: f64,
    /// Weight of the stay-near-unit-gain prior.
    beta: f64,
}

impl Default for GainCompensator {
    fn default() -> Self {
        Self {
            gains: Vec::new(),
            alpha: 0.01,
            beta: 100.0,
        }
    }
}

impl GainCompensator {
    pub fn gains(&self) -> &[f64] {
        &self.gains
    }

    /// Mean intensities and pixel counts over the overlap of patches i and j.
    fn overlap_stats(
        corners: &[Point],
        images: &[RgbImage],
        masks: &[GrayImage],
        i: usize,
        j: usize,
    ) -> Option<(f64, f64, f64)> {
        let rect_of = |idx: usize| {
            Rect::new(
                corners[idx].x,
                corners[idx].y,
                images[idx].width() as i32,
                images[idx].height() as i32,
            )
        };
        let overlap = rect_of(i).intersect(&rect_of(j));
        if overlap.is_empty() {
            return None;
        }

        let mut count = 0u64;
        let mut sum_i = 0.0f64;
        let mut sum_j = 0.0f64;
        for y in overlap.y..overlap.y + overlap.height {
            for x in overlap.x..overlap.x + overlap.width {
                let (xi, yi) = ((x - corners[i].x) as u32, (y - corners[i].y) as u32);
                let (xj, yj) = ((x - corners[j].x) as u32, (y - corners[j].y) as u32);
                if masks[i].get_pixel(xi, yi)[0] == 0 || masks[j].get_pixel(xj, yj)[0] == 0 {
                    continue;
                }
                let pi = images[i].get_pixel(xi, yi);
                let pj = images[j].get_pixel(xj, yj);
                sum_i += (pi[0] as f64 + pi[1] as f64 + pi[2] as f64) / 3.0;
                sum_j += (pj[0] as f64 + pj[1] as f64 + pj[2] as f64) / 3.0;
                count += 1;
            }
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some((n, sum_i / n, sum_j / n))
    }
}

impl ExposureCompensator for GainCompensator {
    fn feed(
        &mut self,
        corners: &[Point],
        images: &[RgbImage],
        masks: &[GrayImage],
    ) -> Result<()> {
        let n = images.len();
        debug_assert_eq!(corners.len(), n);
        debug_assert_eq!(masks.len(), n);
        if n == 0 {
            self.gains.clear();
            return Ok(());
        }

        // Quadratic cost: alpha * N_ij (g_i I_ij - g_j I_ji)^2 summed over
        // overlaps, plus beta * N_i (g_i - 1)^2 anchoring gains at one.
        let mut a = DMatrix::<f64>::zeros(n, n);
        let mut b = DVector::<f64>::zeros(n);

        for i in 0..n {
            for j in i + 1..n {
                let Some((count, mean_i, mean_j)) =
                    Self::overlap_stats(corners, images, masks, i, j)
                else {
                    continue;
                };
                a[(i, i)] += self.alpha * count * mean_i * mean_i;
                a[(j, j)] += self.alpha * count * mean_j * mean_j;
                a[(i, j)] -= self.alpha * count * mean_i * mean_j;
                a[(j, i)] -= self.alpha * count * mean_i * mean_j;
            }
        }
        for i in 0..n {
            let anchor: f64 = masks[i].pixels().filter(|p| p[0] != 0).count() as f64;
            let anchor = anchor.max(1.0);
            a[(i, i)] += self.beta * anchor;
            b[i] += self.beta * anchor;
        }

        let solution = a
            .lu()
            .solve(&b)
            .ok_or_else(|| Error::Algorithm("gain compensation system is singular".to_string()))?;
        if !solution.iter().all(|g| g.is_finite()) {
            return Err(Error::Algorithm(
                "gain compensation produced non-finite gains".to_string(),
            ));
        }
        self.gains = solution.iter().copied().collect();
        Ok(())
    }

    fn apply(&self, idx: usize, _corner: Point, image: &mut RgbImage, _mask: &GrayImage) {
        let Some(&gain) = self.gains.get(idx) else {
            return;
        };
        if (gain - 1.0).abs() < 1e-12 {
            return;
        }
        for pixel in image.pixels_mut() {
            for c in 0..3 {
                pixel[c] = (pixel[c] as f64 * gain).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}
