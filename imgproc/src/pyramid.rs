//! Float image planes and Gaussian/Laplacian pyramids for multi-band
//! blending. Pyramid levels halve exactly, so callers pad their working
//! area to a multiple of `2^levels` before building.

use rayon::prelude::*;

/// Single-channel float image used as blending workspace.
#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![0.0; width * height],
            width,
            height,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.width + x] = v;
    }

    fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.get(x, y)
    }
}

/// 5-tap binomial kernel, normalized.
const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Blur and decimate by 2. Dimensions must be even.
pub fn pyr_down(src: &Plane) -> Plane {
    debug_assert!(src.width % 2 == 0 && src.height % 2 == 0);
    let dw = src.width / 2;
    let dh = src.height / 2;
    let mut dst = Plane::new(dw, dh);

    dst.data
        .par_chunks_mut(dw)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let cx = (x * 2) as isize;
                let cy = (y * 2) as isize;
                let mut acc = 0.0f32;
                for (ky, wy) in KERNEL.iter().enumerate() {
                    let sy = cy + ky as isize - 2;
                    let mut row_acc = 0.0f32;
                    for (kx, wx) in KERNEL.iter().enumerate() {
                        let sx = cx + kx as isize - 2;
                        row_acc += wx * src.get_clamped(sx, sy);
                    }
                    acc += wy * row_acc;
                }
                *out = acc;
            }
        });
    dst
}

/// Upsample to exactly (2w, 2h) with bilinear interpolation.
pub fn pyr_up(src: &Plane) -> Plane {
    let dw = src.width * 2;
    let dh = src.height * 2;
    let mut dst = Plane::new(dw, dh);

    dst.data
        .par_chunks_mut(dw)
        .enumerate()
        .for_each(|(y, row)| {
            let sy = (y as f32 - 0.5) / 2.0;
            let y0 = sy.floor() as isize;
            let fy = sy - y0 as f32;
            for (x, out) in row.iter_mut().enumerate() {
                let sx = (x as f32 - 0.5) / 2.0;
                let x0 = sx.floor() as isize;
                let fx = sx - x0 as f32;

                let v00 = src.get_clamped(x0, y0);
                let v10 = src.get_clamped(x0 + 1, y0);
                let v01 = src.get_clamped(x0, y0 + 1);
                let v11 = src.get_clamped(x0 + 1, y0 + 1);

                let v0 = v00 * (1.0 - fx) + v10 * fx;
                let v1 = v01 * (1.0 - fx) + v11 * fx;
                *out = v0 * (1.0 - fy) + v1 * fy;
            }
        });
    dst
}

/// Gaussian pyramid with `levels + 1` entries, finest first.
pub fn gaussian_pyramid(base: &Plane, levels: usize) -> Vec<Plane> {
    let mut pyr = Vec::with_capacity(levels + 1);
    pyr.push(base.clone());
    for _ in 0..levels {
        let next = pyr_down(pyr.last().unwrap());
        pyr.push(next);
    }
    pyr
}

/// Laplacian pyramid: band-pass residuals plus the coarsest Gaussian level
/// as the final entry. Collapsing reconstructs the base exactly.
pub fn laplacian_pyramid(base: &Plane, levels: usize) -> Vec<Plane> {
    let gauss = gaussian_pyramid(base, levels);
    let mut pyr = Vec::with_capacity(levels + 1);
    for l in 0..levels {
        let up = pyr_up(&gauss[l + 1]);
        let mut lap = gauss[l].clone();
        for (d, u) in lap.data.iter_mut().zip(up.data.iter()) {
            *d -= u;
        }
        pyr.push(lap);
    }
    pyr.push(gauss[levels].clone());
    pyr
}

/// Invert `laplacian_pyramid`: coarsest up, adding residuals back in.
pub fn collapse(pyramid: &[Plane]) -> Plane {
    let mut acc = pyramid[pyramid.len() - 1].clone();
    for lap in pyramid[..pyramid.len() - 1].iter().rev() {
        let up = pyr_up(&acc);
        acc = lap.clone();
        for (d, u) in acc.data.iter_mut().zip(up.data.iter()) {
            *d += u;
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_plane(width: usize, height: usize) -> Plane {
        let mut p = Plane::new(width, height);
        for y in 0..height {
            for x in 0..width {
                p.set(x, y, (x * 3 + y * 7) as f32 % 97.0);
            }
        }
        p
    }

    #[test]
    fn pyr_down_halves_dimensions() {
        let p = gradient_plane(64, 32);
        let d = pyr_down(&p);
        assert_eq!((d.width, d.height), (32, 16));
    }

    #[test]
    fn pyr_up_doubles_dimensions() {
        let p = gradient_plane(16, 16);
        let u = pyr_up(&p);
        assert_eq!((u.width, u.height), (32, 32));
    }

    #[test]
    fn laplacian_collapse_is_exact() {
        let p = gradient_plane(64, 64);
        let pyr = laplacian_pyramid(&p, 3);
        let rec = collapse(&pyr);
        for (a, b) in p.data.iter().zip(rec.data.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn flat_plane_has_zero_residuals() {
        let p = Plane {
            data: vec![42.0; 32 * 32],
            width: 32,
            height: 32,
        };
        let pyr = laplacian_pyramid(&p, 2);
        for lap in &pyr[..2] {
            for v in &lap.data {
                assert!(v.abs() < 1e-4);
            }
        }
    }
}
