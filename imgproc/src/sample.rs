use image::{GrayImage, RgbImage};

/// Out-of-bounds policy for sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderMode {
    Constant(u8),
    Replicate,
    Reflect,
}

fn map_coord(coord: isize, len: usize, mode: BorderMode) -> Option<usize> {
    let n = len as isize;
    if n <= 0 {
        return None;
    }
    match mode {
        BorderMode::Constant(_) => {
            if coord < 0 || coord >= n {
                None
            } else {
                Some(coord as usize)
            }
        }
        BorderMode::Replicate => Some(coord.clamp(0, n - 1) as usize),
        BorderMode::Reflect => {
            if n == 1 {
                return Some(0);
            }
            let period = 2 * n;
            let mut c = coord % period;
            if c < 0 {
                c += period;
            }
            if c >= n {
                c = period - c - 1;
            }
            Some(c as usize)
        }
    }
}

fn gray_at(img: &GrayImage, x: isize, y: isize, border: BorderMode) -> f32 {
    match (
        map_coord(x, img.width() as usize, border),
        map_coord(y, img.height() as usize, border),
    ) {
        (Some(ix), Some(iy)) => img.as_raw()[iy * img.width() as usize + ix] as f32,
        _ => match border {
            BorderMode::Constant(v) => v as f32,
            _ => 0.0,
        },
    }
}

fn rgb_at(img: &RgbImage, x: isize, y: isize, border: BorderMode) -> [f32; 3] {
    match (
        map_coord(x, img.width() as usize, border),
        map_coord(y, img.height() as usize, border),
    ) {
        (Some(ix), Some(iy)) => {
            let p = img.get_pixel(ix as u32, iy as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32]
        }
        _ => match border {
            BorderMode::Constant(v) => [v as f32; 3],
            _ => [0.0; 3],
        },
    }
}

/// Bilinear grayscale sample at fractional coordinates.
pub fn sample_gray_bilinear(img: &GrayImage, x: f32, y: f32, border: BorderMode) -> f32 {
    let x0 = x.floor() as isize;
    let y0 = y.floor() as isize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let v00 = gray_at(img, x0, y0, border);
    let v10 = gray_at(img, x0 + 1, y0, border);
    let v01 = gray_at(img, x0, y0 + 1, border);
    let v11 = gray_at(img, x0 + 1, y0 + 1, border);

    let v0 = v00 * (1.0 - fx) + v10 * fx;
    let v1 = v01 * (1.0 - fx) + v11 * fx;
    v0 * (1.0 - fy) + v1 * fy
}

/// Nearest-neighbor grayscale sample, used for masks so values stay binary.
pub fn sample_gray_nearest(img: &GrayImage, x: f32, y: f32, border: BorderMode) -> f32 {
    gray_at(img, x.round() as isize, y.round() as isize, border)
}

/// Bilinear RGB sample at fractional coordinates.
pub fn sample_rgb_bilinear(img: &RgbImage, x: f32, y: f32, border: BorderMode) -> [f32; 3] {
    let x0 = x.floor() as isize;
    let y0 = y.floor() as isize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let v00 = rgb_at(img, x0, y0, border);
    let v10 = rgb_at(img, x0 + 1, y0, border);
    let v01 = rgb_at(img, x0, y0 + 1, border);
    let v11 = rgb_at(img, x0 + 1, y0 + 1, border);

    let mut out = [0.0f32; 3];
    for c in 0..3 {
        let v0 = v00[c] * (1.0 - fx) + v10[c] * fx;
        let v1 = v01[c] * (1.0 - fx) + v11[c] * fx;
        out[c] = v0 * (1.0 - fy) + v1 * fy;
    }
    out
}
