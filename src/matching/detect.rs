//! Keypoint detection and binary descriptors for the native backend

use std::sync::LazyLock;

use image::GrayImage;
use imageproc::corners::{Corner, corners_fast9};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

/// Bytes per descriptor (256 intensity comparisons)
pub const DESCRIPTOR_BYTES: usize = 32;

pub type Descriptor = [u8; DESCRIPTOR_BYTES];

/// Half-size of the square patch sampled around a keypoint
const PATCH_RADIUS: i32 = 15;
/// Keypoints closer than this to the border cannot be described
const EDGE_MARGIN: u32 = PATCH_RADIUS as u32 + 1;
/// Window radius for non-maximum suppression of FAST responses
const SUPPRESSION_RADIUS: u32 = 3;
/// Smoothing applied before sampling test pairs
const SMOOTHING_SIGMA: f32 = 2.0;
const TEST_PAIR_SEED: u64 = 42;

/// Comparison offsets `[x0, y0, x1, y1]` relative to the keypoint.
/// Fixed across runs so descriptors of identical patches are identical.
static TEST_PAIRS: LazyLock<[[i32; 4]; DESCRIPTOR_BYTES * 8]> = LazyLock::new(|| {
    let mut rng = StdRng::seed_from_u64(TEST_PAIR_SEED);
    let sigma = (2 * PATCH_RADIUS + 1) as f32 / 5.0;
    let mut offset = || {
        let z: f32 = rng.sample(StandardNormal);
        ((z * sigma).round() as i32).clamp(-PATCH_RADIUS, PATCH_RADIUS)
    };

    let mut pairs = [[0; 4]; DESCRIPTOR_BYTES * 8];
    for pair in pairs.iter_mut() {
        loop {
            *pair = [offset(), offset(), offset(), offset()];
            if pair[0..2] != pair[2..4] {
                break;
            }
        }
    }
    pairs
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// Keypoints of one image with their descriptors, index-aligned
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Detect up to `max_keypoints` FAST corners and describe them.
///
/// Output order is strongest first with ties broken by position, so the same
/// image always yields the same features.
pub fn detect_and_compute(image: &GrayImage, max_keypoints: usize, threshold: u8) -> Features {
    let (width, height) = image.dimensions();
    if width <= 2 * EDGE_MARGIN || height <= 2 * EDGE_MARGIN || max_keypoints == 0 {
        return Features::default();
    }

    let corners: Vec<Corner> = corners_fast9(image, threshold)
        .into_iter()
        .filter(|c| {
            c.x >= EDGE_MARGIN
                && c.y >= EDGE_MARGIN
                && c.x < width - EDGE_MARGIN
                && c.y < height - EDGE_MARGIN
        })
        .collect();

    let mut corners = suppress_non_maximum(corners, width, height);
    corners.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });
    corners.truncate(max_keypoints);

    let smoothed = imageproc::filter::gaussian_blur_f32(image, SMOOTHING_SIGMA);

    let keypoints = corners
        .iter()
        .map(|c| Keypoint {
            x: c.x as f32,
            y: c.y as f32,
            score: c.score,
        })
        .collect();
    let descriptors = corners.iter().map(|c| describe(&smoothed, c.x, c.y)).collect();

    Features {
        keypoints,
        descriptors,
    }
}

/// Keep corners whose score is the maximum of their neighborhood.
/// Equal scores are resolved in favor of the earlier pixel in scan order.
fn suppress_non_maximum(corners: Vec<Corner>, width: u32, height: u32) -> Vec<Corner> {
    let mut scores = vec![f32::NEG_INFINITY; (width * height) as usize];
    for c in &corners {
        scores[(c.y * width + c.x) as usize] = c.score;
    }

    corners
        .into_iter()
        .filter(|c| {
            let y_range = c.y.saturating_sub(SUPPRESSION_RADIUS)
                ..=(c.y + SUPPRESSION_RADIUS).min(height - 1);
            let x_range = c.x.saturating_sub(SUPPRESSION_RADIUS)
                ..=(c.x + SUPPRESSION_RADIUS).min(width - 1);
            let own = (c.y, c.x);

            y_range.into_iter().all(|y| {
                x_range.clone().all(|x| {
                    let other = scores[(y * width + x) as usize];
                    other < c.score || (other == c.score && (y, x) >= own)
                })
            })
        })
        .collect()
}

fn describe(image: &GrayImage, x: u32, y: u32) -> Descriptor {
    let (x, y) = (x as i32, y as i32);
    let sample = |dx: i32, dy: i32| image.get_pixel((x + dx) as u32, (y + dy) as u32)[0];

    let mut descriptor = [0u8; DESCRIPTOR_BYTES];
    for (bit, [x0, y0, x1, y1]) in TEST_PAIRS.iter().enumerate() {
        if sample(*x0, *y0) < sample(*x1, *y1) {
            descriptor[bit / 8] |= 1 << (bit % 8);
        }
    }
    descriptor
}
