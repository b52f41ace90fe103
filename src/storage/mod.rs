//! Upload directory layout
//!
//! This module contains:
//! - Path resolution for sanitized client uploads
//! - Unique result files and their public URL

pub mod sanitize;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub use sanitize::secure_filename;

/// URL prefix under which the upload directory is served
pub const PUBLIC_PREFIX: &str = "/static/uploads";

/// Prefix of generated match visualizations
pub const RESULT_PREFIX: &str = "result-";

/// Extension of generated match visualizations
pub const RESULT_SUFFIX: &str = ".png";

/// The single directory holding uploads and generated results
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

/// A result file kept inside the upload directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResult {
    pub path: PathBuf,
    /// Where the file is served from
    pub url: String,
}

impl UploadDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory and any missing parents; a no-op if it exists
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Destination for an uploaded file, or `None` if the name sanitizes to nothing
    pub fn upload_path(&self, untrusted_name: &str) -> Option<PathBuf> {
        secure_filename(untrusted_name).map(|name| self.root.join(name))
    }

    /// Write a uniquely named result file inside the directory.
    ///
    /// `write` gets a buffered handle to a fresh `result-XXXXXX.png`. If it
    /// fails, the file is removed before returning; otherwise it is kept.
    /// This does blocking I/O.
    pub fn write_result<T, E>(
        &self,
        write: impl FnOnce(&mut dyn Write) -> Result<T, E>,
    ) -> Result<(T, StoredResult), E>
    where
        E: From<io::Error>,
    {
        self.ensure()?;
        let mut file = tempfile::Builder::new()
            .prefix(RESULT_PREFIX)
            .suffix(RESULT_SUFFIX)
            .tempfile_in(&self.root)?;

        let value = {
            let mut out = io::BufWriter::new(file.as_file_mut());
            let value = write(&mut out)?;
            out.flush()?;
            value
        };

        let Some(name) = file.path().file_name().and_then(|name| name.to_str()) else {
            return Err(io::Error::other("result file name is not valid UTF-8").into());
        };
        let url = public_url(name);
        let (_, path) = file.keep().map_err(|err| E::from(err.error))?;

        Ok((value, StoredResult { path, url }))
    }
}

/// Public URL of a file stored directly inside the upload directory
pub fn public_url(file_name: &str) -> String {
    format!("{PUBLIC_PREFIX}/{file_name}")
}
