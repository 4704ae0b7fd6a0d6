//! Final composition of seam-carved patches.
//!
//! The multiband blender keeps low frequencies mixing over wide regions
//! while high frequencies switch at the seam, which hides both exposure
//! residue and subpixel registration error.

use image::{GrayImage, RgbImage};
use pano_core::{Error, Point, Rect, Result};
use pano_imgproc::{collapse, gaussian_pyramid, laplacian_pyramid, Plane};

/// Band count for a composite of the given pixel area at the given blend
/// strength (percent of the composite diagonal). Never below one band.
pub fn num_bands(area: i64, strength: f64) -> usize {
    let blend_width = (area.max(0) as f64).sqrt() * strength / 100.0;
    if blend_width < 1.0 {
        return 1;
    }
    let bands = (blend_width.log2().ceil() as i64) - 1;
    bands.max(1) as usize
}

/// Accumulates placed patches and produces the composite.
pub trait Blender {
    /// Hint for blenders that operate on frequency bands; others ignore it.
    fn set_num_bands(&mut self, _bands: usize) {}

    fn prepare(&mut self, roi: Rect);

    fn feed(&mut self, image: &RgbImage, mask: &GrayImage, corner: Point) -> Result<()>;

    /// Consume the accumulated state and return the composite image with
    /// its coverage mask.
    fn blend(&mut self) -> Result<(RgbImage, GrayImage)>;
}

const WEIGHT_EPS: f32 = 1e-5;

/// Laplacian-pyramid blender.
pub struct MultiBandBlender {
    bands: usize,
    /// Composite extent as prepared, before padding.
    roi: Rect,
    /// Padded so every level halves cleanly.
    padded: Rect,
    /// Per band: three color accumulators.
    color_acc: Vec<[Plane; 3]>,
    weight_acc: Vec<Plane>,
}

impl Default for MultiBandBlender {
    fn default() -> Self {
        Self {
            bands: 5,
            roi: Rect::default(),
            padded: Rect::default(),
            color_acc: Vec::new(),
            weight_acc: Vec::new(),
        }
    }
}

impl MultiBandBlender {
    pub fn num_bands(&self) -> usize {
        self.bands
    }
}

impl Blender for MultiBandBlender {
    fn set_num_bands(&mut self, bands: usize) {
        self.bands = bands.max(1);
    }

    fn prepare(&mut self, roi: Rect) {
        // The coarsest level must keep at least two pixels per side.
        let max_bands = (roi.width.min(roi.height).max(2) as f64).log2().floor() as usize;
        self.bands = self.bands.clamp(1, max_bands.max(1));

        let step = 1i32 << self.bands;
        let pad = |len: i32| (len + step - 1) / step * step;
        self.roi = roi;
        self.padded = Rect::new(roi.x, roi.y, pad(roi.width), pad(roi.height));

        self.color_acc.clear();
        self.weight_acc.clear();
        for level in 0..=self.bands {
            let w = (self.padded.width >> level) as usize;
            let h = (self.padded.height >> level) as usize;
            self.color_acc
                .push([Plane::new(w, h), Plane::new(w, h), Plane::new(w, h)]);
            self.weight_acc.push(Plane::new(w, h));
        }
    }

    fn feed(&mut self, image: &RgbImage, mask: &GrayImage, corner: Point) -> Result<()> {
        if self.color_acc.is_empty() {
            return Err(Error::Algorithm(
                "blender fed before prepare".to_string(),
            ));
        }
        let pw = self.padded.width as usize;
        let ph = self.padded.height as usize;
        let off_x = corner.x - self.padded.x;
        let off_y = corner.y - self.padded.y;
        if off_x < 0
            || off_y < 0
            || off_x + image.width() as i32 > self.padded.width
            || off_y + image.height() as i32 > self.padded.height
        {
            return Err(Error::Algorithm(format!(
                "patch at ({}, {}) exceeds prepared extent",
                corner.x, corner.y
            )));
        }

        let mut channels = [Plane::new(pw, ph), Plane::new(pw, ph), Plane::new(pw, ph)];
        let mut weight = Plane::new(pw, ph);
        for (x, y, pixel) in image.enumerate_pixels() {
            if mask.get_pixel(x, y)[0] == 0 {
                continue;
            }
            let px = x as usize + off_x as usize;
            let py = y as usize + off_y as usize;
            for c in 0..3 {
                channels[c].set(px, py, pixel[c] as f32);
            }
            weight.set(px, py, 1.0);
        }

        let weight_pyr = gaussian_pyramid(&weight, self.bands);
        for (c, channel) in channels.iter().enumerate() {
            let lap = laplacian_pyramid(channel, self.bands);
            for level in 0..=self.bands {
                let acc = &mut self.color_acc[level][c];
                for (dst, (src, w)) in acc
                    .data
                    .iter_mut()
                    .zip(lap[level].data.iter().zip(weight_pyr[level].data.iter()))
                {
                    *dst += src * w;
                }
            }
        }
        for level in 0..=self.bands {
            for (dst, w) in self.weight_acc[level]
                .data
                .iter_mut()
                .zip(weight_pyr[level].data.iter())
            {
                *dst += w;
            }
        }
        Ok(())
    }

    fn blend(&mut self) -> Result<(RgbImage, GrayImage)> {
        if self.color_acc.is_empty() {
            return Err(Error::Algorithm("blender has nothing to blend".to_string()));
        }

        let mut out = RgbImage::new(self.roi.width as u32, self.roi.height as u32);
        let mut coverage = GrayImage::new(self.roi.width as u32, self.roi.height as u32);

        for c in 0..3 {
            let normalized: Vec<Plane> = (0..=self.bands)
                .map(|level| {
                    let mut plane = self.color_acc[level][c].clone();
                    for (v, w) in plane.data.iter_mut().zip(self.weight_acc[level].data.iter()) {
                        *v /= w + WEIGHT_EPS;
                    }
                    plane
                })
                .collect();
            let composite = collapse(&normalized);
            for y in 0..self.roi.height as usize {
                for x in 0..self.roi.width as usize {
                    let value = composite.get(x, y).round().clamp(0.0, 255.0) as u8;
                    out.get_pixel_mut(x as u32, y as u32)[c] = value;
                }
            }
        }

        let base_weight = &self.weight_acc[0];
        for y in 0..self.roi.height as usize {
            for x in 0..self.roi.width as usize {
                if base_weight.get(x, y) > WEIGHT_EPS {
                    coverage.put_pixel(x as u32, y as u32, image::Luma([255]));
                }
            }
        }

        self.color_acc.clear();
        self.weight_acc.clear();
        Ok((out, coverage))
    }
}
