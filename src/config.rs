//! Service configuration loaded once at startup

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Feature matching backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherBackend {
    /// FAST corners + binary descriptors, pure Rust
    #[default]
    Native,
    /// OpenCV ORB + brute-force matcher (requires the `opencv` feature)
    OpenCv,
}

impl MatcherBackend {
    pub fn name(self) -> &'static str {
        match self {
            MatcherBackend::Native => "native",
            MatcherBackend::OpenCv => "opencv",
        }
    }
}

/// Tuning for keypoint detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub backend: MatcherBackend,
    /// Maximum number of keypoints kept per image
    pub max_keypoints: usize,
    /// Intensity difference used by the FAST segment test
    pub fast_threshold: u8,
    /// Larger input images are refused before their pixels are decoded
    pub max_image_width: u32,
    pub max_image_height: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            backend: MatcherBackend::Native,
            max_keypoints: 1000,
            fast_threshold: 20,
            max_image_width: 4096,
            max_image_height: 4096,
        }
    }
}

/// Process-wide configuration, immutable once the server is running
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchViewConfig {
    /// Address the HTTP server binds to
    pub listen_addr: SocketAddr,
    /// Directory holding uploads and generated results
    pub upload_dir: PathBuf,
    /// Upper bound for a whole upload request body
    pub max_upload_bytes: usize,
    pub matcher: MatcherConfig,
}

impl Default for MatchViewConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            upload_dir: PathBuf::from("static/uploads"),
            max_upload_bytes: 16 * 1024 * 1024,
            matcher: MatcherConfig::default(),
        }
    }
}

impl MatchViewConfig {
    /// Environment variable naming an optional JSON config file
    pub const ENV_VAR: &'static str = "MATCHVIEW_CONFIG";

    /// Load configuration from the file named by [`Self::ENV_VAR`], or return defaults
    pub fn load() -> Self {
        match std::env::var_os(Self::ENV_VAR) {
            Some(path) => Self::load_from(Path::new(&path)),
            None => Self::default(),
        }
    }

    /// Load configuration from a JSON file, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(config) => config,
                Err(err) => {
                    log::warn!(
                        "Error parsing config {}, using defaults: {}",
                        path.display(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!("Could not read config {}: {}", path.display(), err);
                Self::default()
            }
        }
    }
}
