//! Rotation-only warping onto a spherical canvas.
//!
//! Each cluster image is projected through its estimated camera onto the
//! unit sphere at a shared scale (the cluster's median focal), producing a
//! warped color patch, a validity mask, and the patch's top-left corner in
//! the shared panorama plane.

use image::{GrayImage, RgbImage};
use nalgebra::{Matrix3, Vector3};
use pano_core::{CameraParams, Error, Point, Result, Size};
use pano_imgproc::{sample_rgb_bilinear, BorderMode};

/// Warps one image and its mask through a camera rotation at a given scale.
pub trait RotationWarper {
    fn warp(
        &self,
        image: &RgbImage,
        camera: &CameraParams,
        scale: f64,
    ) -> Result<WarpedImage>;
}

/// One warped cluster member in shared panorama coordinates.
pub struct WarpedImage {
    pub image: RgbImage,
    /// 255 where the patch carries source pixels, 0 elsewhere.
    pub mask: GrayImage,
    pub corner: Point,
}

impl WarpedImage {
    pub fn size(&self) -> Size {
        Size::new(self.image.width() as i32, self.image.height() as i32)
    }
}

/// Forward/backward spherical projection for one camera.
///
/// `r_kinv` lifts source pixels to world rays, `k_rinv` drops world rays
/// back to source pixels.
pub struct SphericalProjector {
    scale: f64,
    r_kinv: Matrix3<f64>,
    k_rinv: Matrix3<f64>,
}

impl SphericalProjector {
    pub fn new(camera: &CameraParams, scale: f64) -> Result<Self> {
        let k = camera.k();
        let k_inv = k.try_inverse().ok_or_else(|| {
            Error::GeometryDegenerate(format!("singular intrinsics, focal {}", camera.focal))
        })?;
        Ok(Self {
            scale,
            r_kinv: camera.rotation * k_inv,
            k_rinv: k * camera.rotation.transpose(),
        })
    }

    /// Source pixel to spherical plane coordinates.
    pub fn map_forward(&self, x: f64, y: f64) -> (f64, f64) {
        let ray = self.r_kinv * Vector3::new(x, y, 1.0);
        let u = self.scale * ray.x.atan2(ray.z);
        let w = ray.y / ray.norm();
        let v = self.scale * (std::f64::consts::PI - w.clamp(-1.0, 1.0).acos());
        (u, v)
    }

    /// Spherical plane coordinates back to a source pixel, or `None` when
    /// the ray exits behind the camera.
    pub fn map_backward(&self, u: f64, v: f64) -> Option<(f64, f64)> {
        let u = u / self.scale;
        let v = v / self.scale;

        let sin_v = (std::f64::consts::PI - v).sin();
        let cos_v = (std::f64::consts::PI - v).cos();
        let ray = Vector3::new(sin_v * u.sin(), cos_v, sin_v * u.cos());

        let p = self.k_rinv * ray;
        if p.z <= 0.0 {
            return None;
        }
        Some((p.x / p.z, p.y / p.z))
    }
}

/// Spherical warper at a fixed canvas scale in pixels per radian.
pub struct SphericalWarper {
    pub border: BorderMode,
}

impl Default for SphericalWarper {
    fn default() -> Self {
        Self {
            border: BorderMode::Reflect,
        }
    }
}

impl RotationWarper for SphericalWarper {
    fn warp(&self, image: &RgbImage, camera: &CameraParams, scale: f64) -> Result<WarpedImage> {
        let projector = SphericalProjector::new(camera, scale)?;
        let (tl, br) = detect_roi(&projector, image.width(), image.height());

        let dst_w = (br.x - tl.x + 1).max(1) as u32;
        let dst_h = (br.y - tl.y + 1).max(1) as u32;
        let mut warped = RgbImage::new(dst_w, dst_h);
        let mut mask = GrayImage::new(dst_w, dst_h);

        let src_w = image.width() as f64;
        let src_h = image.height() as f64;
        for dy in 0..dst_h {
            for dx in 0..dst_w {
                let u = (tl.x + dx as i32) as f64;
                let v = (tl.y + dy as i32) as f64;
                let Some((sx, sy)) = projector.map_backward(u, v) else {
                    continue;
                };
                if sx < -0.5 || sy < -0.5 || sx > src_w - 0.5 || sy > src_h - 0.5 {
                    continue;
                }
                let rgb = sample_rgb_bilinear(image, sx as f32, sy as f32, self.border);
                let px = image::Rgb([
                    rgb[0].round().clamp(0.0, 255.0) as u8,
                    rgb[1].round().clamp(0.0, 255.0) as u8,
                    rgb[2].round().clamp(0.0, 255.0) as u8,
                ]);
                warped.put_pixel(dx, dy, px);
                mask.put_pixel(dx, dy, image::Luma([255]));
            }
        }

        Ok(WarpedImage {
            image: warped,
            mask,
            corner: tl,
        })
    }
}

/// Bound the warped footprint by forward-mapping a border grid of the
/// source image.
fn detect_roi(projector: &SphericalProjector, width: u32, height: u32) -> (Point, Point) {
    const GRID: u32 = 32;
    let mut u_min = f64::INFINITY;
    let mut u_max = f64::NEG_INFINITY;
    let mut v_min = f64::INFINITY;
    let mut v_max = f64::NEG_INFINITY;

    let mut consider = |x: f64, y: f64| {
        let (u, v) = projector.map_forward(x, y);
        if u.is_finite() && v.is_finite() {
            u_min = u_min.min(u);
            u_max = u_max.max(u);
            v_min = v_min.min(v);
            v_max = v_max.max(v);
        }
    };

    for i in 0..=GRID {
        for j in 0..=GRID {
            let x = (width - 1) as f64 * i as f64 / GRID as f64;
            let y = (height - 1) as f64 * j as f64 / GRID as f64;
            consider(x, y);
        }
    }

    (
        Point::new(u_min.floor() as i32, v_min.floor() as i32),
        Point::new(u_max.ceil() as i32, v_max.ceil() as i32),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraParams {
        CameraParams::new(500.0, 160.0, 120.0)
    }

    #[test]
    fn projector_roundtrips_interior_pixels() {
        let projector = SphericalProjector::new(&camera(), 500.0).unwrap();
        for &(x, y) in &[(160.0, 120.0), (40.0, 30.0), (300.0, 210.0)] {
            let (u, v) = projector.map_forward(x, y);
            let (bx, by) = projector.map_backward(u, v).expect("in front of camera");
            assert!((bx - x).abs() < 1e-6, "x: {bx} vs {x}");
            assert!((by - y).abs() < 1e-6, "y: {by} vs {y}");
        }
    }

    #[test]
    fn identity_rotation_centers_principal_point() {
        let projector = SphericalProjector::new(&camera(), 500.0).unwrap();
        let (u, v) = projector.map_forward(160.0, 120.0);
        assert!(u.abs() < 1e-9);
        // Principal ray hits the equator of the sphere parametrization.
        assert!((v - 500.0 * std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn warp_produces_nonempty_mask_and_finite_corner() {
        let mut image = RgbImage::new(64, 48);
        for (x, y, p) in image.enumerate_pixels_mut() {
            *p = image::Rgb([(x * 4) as u8, (y * 5) as u8, 128]);
        }
        let warped = SphericalWarper::default()
            .warp(&image, &CameraParams::new(100.0, 32.0, 24.0), 100.0)
            .unwrap();

        let lit = warped.mask.pixels().filter(|p| p[0] == 255).count();
        assert!(lit > 0);
        assert!(warped.image.width() >= 1 && warped.image.height() >= 1);
        // Principal point maps near the vertical middle of the canvas.
        assert!(warped.corner.y < (100.0 * std::f64::consts::FRAC_PI_2) as i32);
    }
}
