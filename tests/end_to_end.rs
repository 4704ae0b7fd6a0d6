//! Whole-pipeline smoke tests through the umbrella crate, with real
//! capabilities on synthetic imagery.

use image::{Rgb, RgbImage};
use pano::stitching::MemoryLoader;
use pano::Stitcher;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Textured noise so the detector has corners to latch onto.
fn noise_image(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| {
        let v: u8 = rng.gen();
        Rgb([v, v.wrapping_add(40), v.wrapping_mul(3)])
    })
}

fn crop(src: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |dx, dy| *src.get_pixel(x + dx, y + dy))
}

#[test]
fn overlapping_crops_run_to_completion_with_full_accounting() {
    let _ = env_logger::builder().is_test(true).try_init();
    // May lose the race for the global pool against other tests; stitching
    // works on Rayon's default pool either way.
    let _ = pano::init_thread_pool(None);

    let scene = noise_image(320, 200, 11);
    let mut loader = MemoryLoader::new();
    loader.insert("left.png", crop(&scene, 0, 0, 220, 180));
    loader.insert("right.png", crop(&scene, 80, 10, 220, 180));
    let paths = vec!["left.png".to_string(), "right.png".to_string()];

    let mut stitcher = Stitcher::new().with_loader(Box::new(loader));
    let outcome = stitcher.stitch(&paths).unwrap();

    assert_eq!(outcome.batch_size, 2);
    let mut all: Vec<usize> = outcome
        .consumed
        .iter()
        .chain(outcome.discarded.iter())
        .copied()
        .collect();
    all.sort_unstable();
    assert_eq!(all, vec![0, 1]);
    // Consumed images and produced panoramas appear together or not at all.
    assert_eq!(outcome.consumed.is_empty(), outcome.panoramas.is_empty());
    for pano in &outcome.panoramas {
        assert!(pano.image.width() > 0 && pano.image.height() > 0);
        assert!(pano.sources.len() >= 2);
    }
}

#[test]
fn unrelated_images_produce_no_panorama() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut loader = MemoryLoader::new();
    loader.insert("a.png", noise_image(160, 120, 1));
    loader.insert("b.png", noise_image(160, 120, 2));
    let paths = vec!["a.png".to_string(), "b.png".to_string()];

    let mut stitcher = Stitcher::new().with_loader(Box::new(loader));
    let outcome = stitcher.stitch(&paths).unwrap();

    assert!(outcome.panoramas.is_empty());
    assert_eq!(outcome.discarded, vec![0, 1]);
    assert!(outcome.consumed.is_empty());
}

#[test]
fn outcome_writes_named_files() {
    let dir = std::env::temp_dir().join("pano-rs-e2e-write");
    std::fs::create_dir_all(&dir).unwrap();

    let outcome = pano::StitchOutcome {
        panoramas: vec![pano::Panorama {
            image: RgbImage::from_pixel(8, 8, Rgb([10, 20, 30])),
            name: "panorama1.jpg".to_string(),
            sources: vec![0, 1],
        }],
        consumed: vec![0, 1],
        discarded: vec![],
        batch_size: 2,
    };
    outcome.write_to(&dir).unwrap();
    assert!(dir.join("panorama1.jpg").is_file());
    std::fs::remove_file(dir.join("panorama1.jpg")).unwrap();
}
