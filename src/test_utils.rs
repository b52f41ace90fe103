//! Synthetic images shared by unit tests

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageFormat, Luma};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Mid-gray image with overlapping random rectangles, reproducible from `seed`
pub fn textured(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = GrayImage::from_pixel(width, height, Luma([128]));

    let max_w = (width / 3).max(2);
    let max_h = (height / 3).max(2);
    for _ in 0..60 {
        let x0 = rng.gen_range(0..width);
        let y0 = rng.gen_range(0..height);
        let w = rng.gen_range(1..max_w);
        let h = rng.gen_range(1..max_h);
        let level = Luma([rng.gen_range(0..=255u8)]);

        for y in y0..(y0 + h).min(height) {
            for x in x0..(x0 + w).min(width) {
                img.put_pixel(x, y, level);
            }
        }
    }
    img
}

pub fn blank(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([128]))
}

pub fn png_bytes(img: &GrayImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Write `img` as PNG under `dir/name`, whatever the extension of `name`
pub fn save_gray(dir: &Path, name: &str, img: &GrayImage) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, png_bytes(img)).unwrap();
    path
}
