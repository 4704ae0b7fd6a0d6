//! Compositing a warped cluster into one panorama image.

use crate::blend::{num_bands, Blender};
use crate::exposure::ExposureCompensator;
use crate::seam::SeamFinder;
use crate::warp::WarpedImage;
use image::RgbImage;
use pano_core::{result_roi, Result};
use pano_imgproc::{dilate, rect_kernel};

/// Blend strength and seam handling knobs for one compositing run.
pub struct CompositeConfig {
    pub blend_strength: f64,
    /// Grow each seam mask by this kernel before blending so the transition
    /// band straddles the seam instead of stopping at it.
    pub seam_dilation: u32,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            blend_strength: 5.0,
            seam_dilation: 3,
        }
    }
}

/// Run exposure compensation, seam finding, and blending over warped
/// patches. Consumes the patches; returns the panorama image.
pub fn composite_cluster(
    mut warped: Vec<WarpedImage>,
    compensator: &mut dyn ExposureCompensator,
    seam_finder: &dyn SeamFinder,
    blender: &mut dyn Blender,
    config: &CompositeConfig,
) -> Result<RgbImage> {
    let corners: Vec<_> = warped.iter().map(|w| w.corner).collect();
    let sizes: Vec<_> = warped.iter().map(|w| w.size()).collect();

    let images: Vec<_> = warped.iter().map(|w| w.image.clone()).collect();
    let mut seam_masks: Vec<_> = warped.iter().map(|w| w.mask.clone()).collect();
    compensator.feed(&corners, &images, &seam_masks)?;
    seam_finder.find(&images, &corners, &mut seam_masks)?;
    drop(images);

    let roi = result_roi(&corners, &sizes);
    blender.set_num_bands(num_bands(roi.area(), config.blend_strength));
    blender.prepare(roi);

    let kernel = rect_kernel(config.seam_dilation, config.seam_dilation);
    for (idx, patch) in warped.iter_mut().enumerate() {
        compensator.apply(idx, patch.corner, &mut patch.image, &patch.mask);

        // Dilated seam ownership, clipped back to the warp's valid pixels.
        let mut blend_mask = dilate(&seam_masks[idx], &kernel);
        for (grown, valid) in blend_mask.pixels_mut().zip(patch.mask.pixels()) {
            if valid[0] == 0 {
                grown[0] = 0;
            }
        }

        blender.feed(&patch.image, &blend_mask, patch.corner)?;
    }

    let (panorama, _coverage) = blender.blend()?;
    Ok(panorama)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::MultiBandBlender;
    use crate::exposure::GainCompensator;
    use crate::seam::VoronoiSeamFinder;
    use image::GrayImage;
    use pano_core::Point;

    fn patch(value: u8, corner: Point) -> WarpedImage {
        WarpedImage {
            image: RgbImage::from_pixel(40, 32, image::Rgb([value, value, value])),
            mask: GrayImage::from_pixel(40, 32, image::Luma([255])),
            corner,
        }
    }

    #[test]
    fn overlapping_flat_patches_composite_to_their_extent() {
        let warped = vec![patch(90, Point::new(0, 0)), patch(110, Point::new(24, 0))];

        let panorama = composite_cluster(
            warped,
            &mut GainCompensator::default(),
            &VoronoiSeamFinder,
            &mut MultiBandBlender::default(),
            &CompositeConfig::default(),
        )
        .unwrap();

        assert_eq!(panorama.dimensions(), (64, 32));
        // Interior pixels stay in the value range of the sources.
        let left = panorama.get_pixel(4, 16)[0];
        let right = panorama.get_pixel(60, 16)[0];
        assert!((80..=120).contains(&left), "left {left}");
        assert!((80..=120).contains(&right), "right {right}");
    }

    #[test]
    fn single_patch_composites_unchanged() {
        let warped = vec![patch(133, Point::new(0, 0))];
        let panorama = composite_cluster(
            warped,
            &mut GainCompensator::default(),
            &VoronoiSeamFinder,
            &mut MultiBandBlender::default(),
            &CompositeConfig::default(),
        )
        .unwrap();
        assert_eq!(panorama.dimensions(), (40, 32));
        let center = panorama.get_pixel(20, 16)[0];
        assert!((center as i32 - 133).abs() <= 1, "center {center}");
    }
}
