//! Seam placement between overlapping warped patches.
//!
//! Masks come in as warp validity and leave as ownership: after seam
//! finding, each composite pixel inside an overlap belongs to exactly one
//! patch. The blender then feathers across the seam lines.

use image::{GrayImage, RgbImage};
use pano_core::{Point, Rect, Result};

/// Resolves overlap ownership by carving the warp masks in place.
///
/// Pixel data is available for finders that cost seams by image content;
/// the Voronoi finder ignores it.
pub trait SeamFinder {
    fn find(
        &self,
        images: &[RgbImage],
        corners: &[Point],
        masks: &mut [GrayImage],
    ) -> Result<()>;
}

/// Leaves the warp masks untouched; overlaps are resolved by blend weights
/// alone.
#[derive(Default)]
pub struct NoSeamFinder;

impl SeamFinder for NoSeamFinder {
    fn find(&self, _: &[RgbImage], _: &[Point], _: &mut [GrayImage]) -> Result<()> {
        Ok(())
    }
}

/// Voronoi seams: every overlap pixel goes to the patch whose center is
/// nearest, with the lower cluster position winning ties.
#[derive(Default)]
pub struct VoronoiSeamFinder;

impl VoronoiSeamFinder {
    fn patch_center(corner: Point, mask: &GrayImage) -> (f64, f64) {
        (
            corner.x as f64 + mask.width() as f64 / 2.0,
            corner.y as f64 + mask.height() as f64 / 2.0,
        )
    }
}

impl SeamFinder for VoronoiSeamFinder {
    fn find(&self, _images: &[RgbImage], corners: &[Point], masks: &mut [GrayImage]) -> Result<()> {
        let n = masks.len();
        debug_assert_eq!(corners.len(), n);

        let rects: Vec<Rect> = (0..n)
            .map(|i| {
                Rect::new(
                    corners[i].x,
                    corners[i].y,
                    masks[i].width() as i32,
                    masks[i].height() as i32,
                )
            })
            .collect();
        let centers: Vec<(f64, f64)> = (0..n)
            .map(|i| Self::patch_center(corners[i], &masks[i]))
            .collect();

        for i in 0..n {
            for j in i + 1..n {
                let overlap = rects[i].intersect(&rects[j]);
                if overlap.is_empty() {
                    continue;
                }
                for y in overlap.y..overlap.y + overlap.height {
                    for x in overlap.x..overlap.x + overlap.width {
                        let (xi, yi) = ((x - corners[i].x) as u32, (y - corners[i].y) as u32);
                        let (xj, yj) = ((x - corners[j].x) as u32, (y - corners[j].y) as u32);
                        if masks[i].get_pixel(xi, yi)[0] == 0
                            || masks[j].get_pixel(xj, yj)[0] == 0
                        {
                            continue;
                        }
                        let di = dist2(centers[i], x, y);
                        let dj = dist2(centers[j], x, y);
                        if di <= dj {
                            masks[j].put_pixel(xj, yj, image::Luma([0]));
                        } else {
                            masks[i].put_pixel(xi, yi, image::Luma([0]));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn dist2(center: (f64, f64), x: i32, y: i32) -> f64 {
    let dx = x as f64 + 0.5 - center.0;
    let dy = y as f64 + 0.5 - center.1;
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_mask(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([255]))
    }

    #[test]
    fn overlap_pixels_end_up_in_exactly_one_mask() {
        let corners = vec![Point::new(0, 0), Point::new(30, 0)];
        let images = vec![RgbImage::new(50, 40), RgbImage::new(50, 40)];
        let mut masks = vec![full_mask(50, 40), full_mask(50, 40)];

        VoronoiSeamFinder.find(&images, &corners, &mut masks).unwrap();

        for x in 30..50 {
            for y in 0..40 {
                let in_first = masks[0].get_pixel(x, y)[0] != 0;
                let in_second = masks[1].get_pixel(x - 30, y)[0] != 0;
                assert!(
                    in_first ^ in_second,
                    "pixel ({x}, {y}) owned by {} masks",
                    in_first as u8 + in_second as u8
                );
            }
        }
    }

    #[test]
    fn seam_splits_overlap_by_proximity() {
        let corners = vec![Point::new(0, 0), Point::new(30, 0)];
        let images = vec![RgbImage::new(50, 40), RgbImage::new(50, 40)];
        let mut masks = vec![full_mask(50, 40), full_mask(50, 40)];

        VoronoiSeamFinder.find(&images, &corners, &mut masks).unwrap();

        // Centers sit at x = 25 and x = 55; the midline is x = 40.
        assert_ne!(masks[0].get_pixel(31, 20)[0], 0);
        assert_eq!(masks[1].get_pixel(1, 20)[0], 0);
        assert_eq!(masks[0].get_pixel(48, 20)[0], 0);
        assert_ne!(masks[1].get_pixel(18, 20)[0], 0);
    }

    #[test]
    fn non_overlapping_masks_are_untouched() {
        let corners = vec![Point::new(0, 0), Point::new(100, 0)];
        let images = vec![RgbImage::new(50, 40), RgbImage::new(50, 40)];
        let mut masks = vec![full_mask(50, 40), full_mask(50, 40)];
        VoronoiSeamFinder.find(&images, &corners, &mut masks).unwrap();
        assert!(masks.iter().all(|m| m.pixels().all(|p| p[0] == 255)));
    }
}
