//! Keypoint detection and matching
//!
//! This module contains:
//! - The [`FeatureMatcher`] seam the HTTP layer depends on
//! - The native backend (FAST corners + binary descriptors)
//! - The OpenCV ORB backend, behind the `opencv` feature

pub mod detect;
pub mod knn;
pub mod native;
#[cfg(feature = "opencv")]
pub mod orb;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{MatcherBackend, MatcherConfig};

pub use knn::RATIO_TEST;
pub use native::NativeMatcher;

/// Failure conditions of a match run
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Image at '{name}' not found or unable to load.")]
    Unreadable { name: String, reason: String },

    #[error("One of the images does not have enough features to match.")]
    InsufficientFeatures,

    #[error("Failed to write match result: {0}")]
    Output(#[from] std::io::Error),

    #[error("Feature matching backend failed: {0}")]
    Backend(String),
}

impl MatchError {
    pub fn unreadable(path: &Path, reason: impl ToString) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::Unreadable {
            name,
            reason: reason.to_string(),
        }
    }

    /// Whether the failure was caused by the submitted images rather than the server
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            MatchError::Unreadable { .. } | MatchError::InsufficientFeatures
        )
    }
}

/// Summary of a successful match run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchReport {
    pub origin_keypoints: usize,
    pub concat_keypoints: usize,
    /// Correspondences that passed the ratio test
    pub matches: usize,
}

/// Detects, matches and visualizes keypoints of two image files.
///
/// Both images are read as grayscale. The composite (origin on the left,
/// concat on the right, one connector per accepted match) is encoded as PNG
/// into `output`. Input errors are reported before anything is written.
pub trait FeatureMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn match_images(
        &self,
        origin: &Path,
        concat: &Path,
        output: &mut dyn Write,
    ) -> Result<MatchReport, MatchError>;
}

/// Build the backend selected in the configuration
pub fn from_config(config: &MatcherConfig) -> Arc<dyn FeatureMatcher> {
    match config.backend {
        MatcherBackend::Native => Arc::new(NativeMatcher::new(config)),
        MatcherBackend::OpenCv => opencv_matcher(config),
    }
}

#[cfg(feature = "opencv")]
fn opencv_matcher(config: &MatcherConfig) -> Arc<dyn FeatureMatcher> {
    Arc::new(orb::OrbMatcher::new(config))
}

#[cfg(not(feature = "opencv"))]
fn opencv_matcher(config: &MatcherConfig) -> Arc<dyn FeatureMatcher> {
    log::warn!(
        "Matcher backend '{}' requires the `opencv` feature, using the native matcher",
        config.backend.name()
    );
    Arc::new(NativeMatcher::new(config))
}
