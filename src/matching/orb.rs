//! OpenCV backend: ORB keypoints, brute-force Hamming matcher, `draw_matches_knn`

use std::io::Write;
use std::path::Path;

use image::ImageReader;
use opencv::core::{self, DMatch, KeyPoint, Mat, Scalar, Vector};
use opencv::features2d::{self, BFMatcher, DrawMatchesFlags, ORB, ORB_ScoreType};
use opencv::imgcodecs;
use opencv::prelude::*;

use super::{FeatureMatcher, MatchError, MatchReport, RATIO_TEST};
use crate::config::MatcherConfig;

impl From<opencv::Error> for MatchError {
    fn from(err: opencv::Error) -> Self {
        MatchError::Backend(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct OrbMatcher {
    max_keypoints: i32,
    fast_threshold: i32,
    max_width: u32,
    max_height: u32,
}

impl OrbMatcher {
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            max_keypoints: i32::try_from(config.max_keypoints).unwrap_or(i32::MAX),
            fast_threshold: i32::from(config.fast_threshold),
            max_width: config.max_image_width,
            max_height: config.max_image_height,
        }
    }

    fn detect_and_compute(&self, img: &Mat) -> Result<(Vector<KeyPoint>, Mat), MatchError> {
        let mut orb = ORB::create(
            self.max_keypoints,
            1.2, // scaleFactor
            8,   // nlevels
            31,  // edgeThreshold
            0,   // firstLevel
            2,   // WTA_K
            ORB_ScoreType::HARRIS_SCORE,
            31, // patchSize
            self.fast_threshold,
        )?;

        let mut keypoints = Vector::<KeyPoint>::new();
        let mut descriptors = Mat::default();
        orb.detect_and_compute(img, &Mat::default(), &mut keypoints, &mut descriptors, false)?;
        Ok((keypoints, descriptors))
    }
}

/// Refuse images whose header declares dimensions beyond the bounds,
/// before `imread` allocates their pixels
fn check_dimensions(path: &Path, max_width: u32, max_height: u32) -> Result<(), MatchError> {
    let (width, height) = ImageReader::open(path)
        .map_err(|err| MatchError::unreadable(path, err))?
        .with_guessed_format()
        .map_err(|err| MatchError::unreadable(path, err))?
        .into_dimensions()
        .map_err(|err| MatchError::unreadable(path, err))?;
    if width > max_width || height > max_height {
        return Err(MatchError::unreadable(
            path,
            format!("{width}x{height} exceeds {max_width}x{max_height}"),
        ));
    }
    Ok(())
}

fn read_gray(path: &Path) -> Result<Mat, MatchError> {
    let Some(name) = path.to_str() else {
        return Err(MatchError::unreadable(path, "path is not valid UTF-8"));
    };
    let img = imgcodecs::imread(name, imgcodecs::IMREAD_GRAYSCALE)?;
    if img.empty() {
        return Err(MatchError::unreadable(path, "imread returned an empty image"));
    }
    Ok(img)
}

impl FeatureMatcher for OrbMatcher {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn match_images(
        &self,
        origin: &Path,
        concat: &Path,
        output: &mut dyn Write,
    ) -> Result<MatchReport, MatchError> {
        check_dimensions(origin, self.max_width, self.max_height)?;
        check_dimensions(concat, self.max_width, self.max_height)?;
        let img1 = read_gray(origin)?;
        let img2 = read_gray(concat)?;

        let (kp1, des1) = self.detect_and_compute(&img1)?;
        let (kp2, des2) = self.detect_and_compute(&img2)?;
        if des1.empty() || des2.empty() {
            return Err(MatchError::InsufficientFeatures);
        }

        let matcher = BFMatcher::create(core::NORM_HAMMING, false)?;
        let mut knn_matches = Vector::<Vector<DMatch>>::new();
        matcher.knn_train_match(&des1, &des2, &mut knn_matches, 2, &Mat::default(), false)?;

        let mut good = Vector::<Vector<DMatch>>::new();
        for pair in knn_matches.iter() {
            if pair.len() < 2 {
                continue;
            }
            let (m, n) = (pair.get(0)?, pair.get(1)?);
            if m.distance < RATIO_TEST * n.distance {
                good.push(std::iter::once(m).collect());
            }
        }

        let mut composite = Mat::default();
        features2d::draw_matches_knn(
            &img1,
            &kp1,
            &img2,
            &kp2,
            &good,
            &mut composite,
            Scalar::all(-1.0),
            Scalar::all(-1.0),
            &Vector::<Vector<i8>>::new(),
            DrawMatchesFlags::NOT_DRAW_SINGLE_POINTS,
        )?;

        let mut encoded = Vector::<u8>::new();
        if !imgcodecs::imencode(".png", &composite, &mut encoded, &Vector::<i32>::new())? {
            return Err(MatchError::Backend("imencode refused the composite".into()));
        }
        let bytes: Vec<u8> = encoded.iter().collect();
        output.write_all(&bytes)?;

        Ok(MatchReport {
            origin_keypoints: kp1.len(),
            concat_keypoints: kp2.len(),
            matches: good.len(),
        })
    }
}

#[cfg(all(test, feature = "opencv"))]
mod tests {
    use super::*;
    use crate::test_utils::{blank, save_gray, textured};

    fn matcher() -> OrbMatcher {
        OrbMatcher::new(&MatcherConfig::default())
    }

    #[test]
    fn test_identical_images_match() {
        let tmp = tempfile::tempdir().unwrap();
        let a = save_gray(tmp.path(), "a.png", &textured(240, 180, 21));

        let mut out = Vec::new();
        let report = matcher().match_images(&a, &a, &mut out).unwrap();
        assert!(report.origin_keypoints > 0);
        assert_eq!(report.origin_keypoints, report.concat_keypoints);
        assert!(report.matches > 0);
    }

    #[test]
    fn test_composite_spans_both_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        let a = save_gray(tmp.path(), "a.png", &textured(240, 180, 22));
        let b = save_gray(tmp.path(), "b.png", &textured(200, 220, 22));

        let mut out = Vec::new();
        matcher().match_images(&a, &b, &mut out).unwrap();
        let composite = image::load_from_memory(&out).unwrap();
        assert_eq!((composite.width(), composite.height()), (440, 220));
    }

    #[test]
    fn test_blank_image_has_insufficient_features() {
        let tmp = tempfile::tempdir().unwrap();
        let a = save_gray(tmp.path(), "a.png", &textured(240, 180, 23));
        let b = save_gray(tmp.path(), "b.png", &blank(240, 180));

        let mut out = Vec::new();
        let err = matcher().match_images(&a, &b, &mut out).unwrap_err();
        assert!(matches!(err, MatchError::InsufficientFeatures));
        assert!(out.is_empty());
    }

    #[test]
    fn test_junk_bytes_are_unreadable() {
        let tmp = tempfile::tempdir().unwrap();
        let a = save_gray(tmp.path(), "a.png", &textured(240, 180, 24));
        let b = tmp.path().join("junk.png");
        std::fs::write(&b, b"definitely not an image").unwrap();

        let err = matcher().match_images(&a, &b, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, MatchError::Unreadable { ref name, .. } if name == "junk.png"));
    }

    #[test]
    fn test_oversized_image_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let small = save_gray(tmp.path(), "small.png", &textured(200, 100, 25));
        let wide = save_gray(tmp.path(), "wide.png", &textured(300, 100, 26));
        let m = OrbMatcher::new(&MatcherConfig {
            max_image_width: 256,
            max_image_height: 256,
            ..MatcherConfig::default()
        });

        let err = m.match_images(&small, &wide, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, MatchError::Unreadable { ref name, .. } if name == "wide.png"));
    }
}
