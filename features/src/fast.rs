use image::GrayImage;
use pano_core::{KeyPoint, KeyPoints};

const CIRCLE_OFFSETS: [(i32, i32); 12] = [
    (-3, 0),
    (-2, 1),
    (-1, 2),
    (0, 3),
    (1, 2),
    (2, 1),
    (3, 0),
    (2, -1),
    (1, -2),
    (0, -3),
    (-1, -2),
    (-2, -1),
];

/// FAST-style corner detection on a 12-point Bresenham circle.
///
/// A pixel is a corner when at least 9 of the 12 sampled circle pixels are
/// brighter than the center by `threshold`, or at least 9 are darker. The
/// hits need not form a contiguous arc; the larger of the two counts is the
/// response, used to rank keypoints before truncation.
pub fn fast_detect(image: &GrayImage, threshold: u8, max_keypoints: usize) -> KeyPoints {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let mut keypoints = Vec::new();

    for y in 3..height - 3 {
        for x in 3..width - 3 {
            let score = corner_score(image, x, y, threshold);
            if score >= 9 {
                keypoints.push(KeyPoint::new(x as f64, y as f64).with_response(score as f64));
            }
        }
    }

    if keypoints.len() > max_keypoints {
        keypoints.sort_by(|a, b| {
            b.response
                .partial_cmp(&a.response)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        keypoints.truncate(max_keypoints);
    }

    KeyPoints { keypoints }
}

fn corner_score(image: &GrayImage, x: i32, y: i32, threshold: u8) -> u32 {
    let p = image.get_pixel(x as u32, y as u32)[0];

    let mut brighter = 0u32;
    let mut darker = 0u32;

    for &(dx, dy) in &CIRCLE_OFFSETS {
        let val = image.get_pixel((x + dx) as u32, (y + dy) as u32)[0];
        if val > p.saturating_add(threshold) {
            brighter += 1;
        } else if val < p.saturating_sub(threshold) {
            darker += 1;
        }
    }

    brighter.max(darker)
}
