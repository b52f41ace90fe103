//! Pure-Rust matching backend

use std::io::Write;
use std::path::Path;

use image::{GrayImage, ImageReader, Limits};

use super::detect::{self, Features};
use super::{FeatureMatcher, MatchError, MatchReport, knn};
use crate::config::MatcherConfig;
use crate::render::image::{Connector, draw_connectors, encode_png, side_by_side};

/// FAST corners, 256-bit binary descriptors and brute-force 2-NN matching
#[derive(Debug, Clone)]
pub struct NativeMatcher {
    max_keypoints: usize,
    fast_threshold: u8,
    max_width: u32,
    max_height: u32,
}

impl NativeMatcher {
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            max_keypoints: config.max_keypoints,
            fast_threshold: config.fast_threshold,
            max_width: config.max_image_width,
            max_height: config.max_image_height,
        }
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_width);
        limits.max_image_height = Some(self.max_height);
        limits
    }

    fn features(&self, image: &GrayImage) -> Features {
        detect::detect_and_compute(image, self.max_keypoints, self.fast_threshold)
    }
}

/// Decode an image file regardless of its extension and convert it to grayscale.
/// Dimensions beyond `limits` are refused from the header alone.
fn load_gray(path: &Path, limits: Limits) -> Result<GrayImage, MatchError> {
    let mut reader = ImageReader::open(path)
        .map_err(|err| MatchError::unreadable(path, err))?
        .with_guessed_format()
        .map_err(|err| MatchError::unreadable(path, err))?;
    reader.limits(limits);
    let decoded = reader
        .decode()
        .map_err(|err| MatchError::unreadable(path, err))?;
    Ok(decoded.to_luma8())
}

impl FeatureMatcher for NativeMatcher {
    fn name(&self) -> &'static str {
        "native"
    }

    fn match_images(
        &self,
        origin: &Path,
        concat: &Path,
        output: &mut dyn Write,
    ) -> Result<MatchReport, MatchError> {
        let origin_img = load_gray(origin, self.limits())?;
        let concat_img = load_gray(concat, self.limits())?;

        let origin_features = self.features(&origin_img);
        let concat_features = self.features(&concat_img);
        log::debug!(
            "Detected {} + {} keypoints ({}x{}, {}x{})",
            origin_features.len(),
            concat_features.len(),
            origin_img.width(),
            origin_img.height(),
            concat_img.width(),
            concat_img.height()
        );

        if origin_features.is_empty() || concat_features.is_empty() {
            return Err(MatchError::InsufficientFeatures);
        }

        let matches =
            knn::match_descriptors(&origin_features.descriptors, &concat_features.descriptors);

        let connectors: Vec<Connector> = matches
            .iter()
            .map(|m| {
                let a = origin_features.keypoints[m.query];
                let b = concat_features.keypoints[m.train];
                Connector {
                    from: (a.x, a.y),
                    to: (b.x, b.y),
                }
            })
            .collect();

        let mut canvas = side_by_side(&origin_img, &concat_img);
        draw_connectors(&mut canvas, origin_img.width() as f32, &connectors);
        encode_png(output, &canvas)?;

        Ok(MatchReport {
            origin_keypoints: origin_features.len(),
            concat_keypoints: concat_features.len(),
            matches: matches.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{blank, save_gray, textured};

    fn matcher() -> NativeMatcher {
        NativeMatcher::new(&MatcherConfig::default())
    }

    #[test]
    fn test_identical_images_match() {
        let tmp = tempfile::tempdir().unwrap();
        let a = save_gray(tmp.path(), "a.png", &textured(240, 180, 11));

        let mut out = Vec::new();
        let report = matcher().match_images(&a, &a, &mut out).unwrap();
        assert!(report.origin_keypoints > 0);
        assert_eq!(report.origin_keypoints, report.concat_keypoints);
        assert!(report.matches > 0);

        let composite = image::load_from_memory(&out).unwrap();
        assert_eq!((composite.width(), composite.height()), (480, 180));
    }

    #[test]
    fn test_shifted_crop_matches_with_offset() {
        let tmp = tempfile::tempdir().unwrap();
        let full = textured(260, 200, 12);
        let crop = image::imageops::crop_imm(&full, 20, 10, 200, 160).to_image();
        let a = save_gray(tmp.path(), "full.png", &full);
        let b = save_gray(tmp.path(), "crop.png", &crop);

        let m = matcher();
        let report = m.match_images(&a, &b, &mut Vec::new()).unwrap();
        assert!(report.matches > 0);

        let fa = m.features(&full);
        let fb = m.features(&crop);
        let matches = knn::match_descriptors(&fa.descriptors, &fb.descriptors);
        let consistent = matches
            .iter()
            .filter(|mt| {
                let (p, q) = (fa.keypoints[mt.query], fb.keypoints[mt.train]);
                p.x - q.x == 20.0 && p.y - q.y == 10.0
            })
            .count();
        assert!(consistent * 2 > matches.len(), "{consistent}/{}", matches.len());
    }

    #[test]
    fn test_blank_image_has_insufficient_features() {
        let tmp = tempfile::tempdir().unwrap();
        let a = save_gray(tmp.path(), "a.png", &textured(240, 180, 13));
        let b = save_gray(tmp.path(), "b.png", &blank(240, 180));

        let mut out = Vec::new();
        let err = matcher().match_images(&a, &b, &mut out).unwrap_err();
        assert!(matches!(err, MatchError::InsufficientFeatures));
        assert!(out.is_empty());
    }

    #[test]
    fn test_undecodable_file_is_unreadable() {
        let tmp = tempfile::tempdir().unwrap();
        let a = save_gray(tmp.path(), "a.png", &textured(240, 180, 14));
        let b = tmp.path().join("notes.png");
        std::fs::write(&b, b"definitely not an image").unwrap();

        let err = matcher().match_images(&a, &b, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, MatchError::Unreadable { ref name, .. } if name == "notes.png"));

        let missing = tmp.path().join("missing.png");
        let err = matcher()
            .match_images(&missing, &a, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, MatchError::Unreadable { .. }));
    }

    #[test]
    fn test_oversized_image_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let small = save_gray(tmp.path(), "small.png", &textured(200, 100, 18));
        let wide = save_gray(tmp.path(), "wide.png", &textured(300, 100, 19));
        let tall = save_gray(tmp.path(), "tall.png", &textured(100, 300, 20));
        let m = NativeMatcher::new(&MatcherConfig {
            max_image_width: 256,
            max_image_height: 256,
            ..MatcherConfig::default()
        });

        let mut out = Vec::new();
        let err = m.match_images(&small, &wide, &mut out).unwrap_err();
        assert!(matches!(err, MatchError::Unreadable { ref name, .. } if name == "wide.png"));
        let err = m.match_images(&tall, &small, &mut out).unwrap_err();
        assert!(matches!(err, MatchError::Unreadable { ref name, .. } if name == "tall.png"));
        assert!(out.is_empty());

        assert!(m.match_images(&small, &small, &mut out).is_ok());
    }

    #[test]
    fn test_extension_does_not_matter() {
        let tmp = tempfile::tempdir().unwrap();
        let a = save_gray(tmp.path(), "upload.bin", &textured(200, 200, 15));

        assert!(matcher().match_images(&a, &a, &mut Vec::new()).is_ok());
    }

    #[test]
    fn test_output_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let a = save_gray(tmp.path(), "a.png", &textured(220, 200, 16));
        let b = save_gray(tmp.path(), "b.png", &textured(220, 200, 17));

        let (mut first, mut second) = (Vec::new(), Vec::new());
        let r1 = matcher().match_images(&a, &b, &mut first).unwrap();
        let r2 = matcher().match_images(&a, &b, &mut second).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(first, second);
    }
}
