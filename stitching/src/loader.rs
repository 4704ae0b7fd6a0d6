use image::RgbImage;
use pano_core::{Error, Result};
use std::collections::HashMap;

/// Decodes one input path into a pixel buffer. File formats and storage are
/// collaborator concerns; the pipeline only needs decoded RGB.
pub trait ImageLoader {
    fn load(&self, path: &str) -> Result<RgbImage>;
}

/// Loads images from the filesystem through the `image` crate.
#[derive(Debug, Default)]
pub struct FsLoader;

impl ImageLoader for FsLoader {
    fn load(&self, path: &str) -> Result<RgbImage> {
        let img = image::open(path).map_err(|source| Error::Decode {
            path: path.to_string(),
            source,
        })?;
        Ok(img.to_rgb8())
    }
}

/// In-memory loader keyed by pseudo-path. Lets tests drive the full
/// pipeline without touching disk; unknown paths fail like a missing file.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    images: HashMap<String, RgbImage>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, image: RgbImage) {
        self.images.insert(path.into(), image);
    }
}

impl ImageLoader for MemoryLoader {
    fn load(&self, path: &str) -> Result<RgbImage> {
        self.images.get(path).cloned().ok_or_else(|| Error::Decode {
            path: path.to_string(),
            source: image::ImageError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such in-memory image",
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_loader_round_trips() {
        let mut loader = MemoryLoader::new();
        loader.insert("a.jpg", RgbImage::new(4, 4));
        assert!(loader.load("a.jpg").is_ok());
        assert!(matches!(
            loader.load("missing.jpg"),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn fs_loader_reports_decode_error_for_missing_file() {
        let err = FsLoader.load("/nonexistent/definitely-not-here.png");
        assert!(matches!(err, Err(Error::Decode { .. })));
    }
}
