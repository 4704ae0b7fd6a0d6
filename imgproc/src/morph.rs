use image::GrayImage;

/// Offsets of a filled width x height rectangular structuring element.
pub fn rect_kernel(width: u32, height: u32) -> Vec<(i32, i32)> {
    let cx = width as i32 / 2;
    let cy = height as i32 / 2;
    let mut kernel = Vec::with_capacity((width * height) as usize);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            kernel.push((x - cx, y - cy));
        }
    }
    kernel
}

/// Grayscale dilation: each output pixel is the max over the kernel window.
/// For the binary masks used in seam blending this grows the kept region.
pub fn dilate(src: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    let width = src.width() as i32;
    let height = src.height() as i32;
    let mut dst = GrayImage::new(src.width(), src.height());

    for y in 0..height {
        for x in 0..width {
            let mut max_val = 0u8;
            for &(dx, dy) in kernel {
                let px = x + dx;
                let py = y + dy;
                if px >= 0 && px < width && py >= 0 && py < height {
                    max_val = max_val.max(src.get_pixel(px as u32, py as u32)[0]);
                }
            }
            dst.put_pixel(x as u32, y as u32, image::Luma([max_val]));
        }
    }
    dst
}
