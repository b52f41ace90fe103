//! Reception and storage of the two uploaded images

use std::path::PathBuf;

use axum::body::Bytes;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use thiserror::Error;

use crate::storage::UploadDir;

/// Form field carrying the reference image
pub const ORIGIN_FIELD: &str = "origin_image";
/// Form field carrying the image searched for the reference's features
pub const CONCAT_FIELD: &str = "concat_image";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing file field '{0}'")]
    MissingField(&'static str),

    #[error("file field '{0}' has an empty filename")]
    EmptyFilename(&'static str),

    #[error("filename {name:?} in field '{field}' has no usable characters")]
    UnsafeFilename { field: &'static str, name: String },

    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Whether the form was incomplete, as opposed to unreadable or unstorable
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            IngestError::MissingField(_)
                | IngestError::EmptyFilename(_)
                | IngestError::UnsafeFilename { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied, untrusted
    pub file_name: String,
    pub bytes: Bytes,
}

/// Both uploads, validated for presence and non-empty names
#[derive(Debug, Clone)]
pub struct UploadPair {
    pub origin: UploadedFile,
    pub concat: UploadedFile,
}

/// Where the uploads ended up on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPair {
    pub origin: PathBuf,
    pub concat: PathBuf,
}

impl UploadPair {
    pub fn from_parts(
        origin: Option<UploadedFile>,
        concat: Option<UploadedFile>,
    ) -> Result<Self, IngestError> {
        let origin = origin.ok_or(IngestError::MissingField(ORIGIN_FIELD))?;
        let concat = concat.ok_or(IngestError::MissingField(CONCAT_FIELD))?;

        if origin.file_name.is_empty() {
            return Err(IngestError::EmptyFilename(ORIGIN_FIELD));
        }
        if concat.file_name.is_empty() {
            return Err(IngestError::EmptyFilename(CONCAT_FIELD));
        }

        Ok(Self { origin, concat })
    }
}

/// Read the whole multipart body, keeping only the two image fields
pub async fn receive(mut multipart: Multipart) -> Result<UploadPair, IngestError> {
    let mut origin = None;
    let mut concat = None;

    while let Some(field) = multipart.next_field().await? {
        let slot = match field.name() {
            Some(ORIGIN_FIELD) => &mut origin,
            Some(CONCAT_FIELD) => &mut concat,
            _ => continue,
        };
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        *slot = Some(UploadedFile { file_name, bytes });
    }

    UploadPair::from_parts(origin, concat)
}

/// Write both uploads under their sanitized names.
///
/// Both names are resolved before anything is written. Existing files with
/// the same name are replaced; a failed second write leaves the first file.
pub async fn persist(dir: &UploadDir, pair: &UploadPair) -> Result<StoredPair, IngestError> {
    let resolve = |field: &'static str, file: &UploadedFile| {
        dir.upload_path(&file.file_name)
            .ok_or_else(|| IngestError::UnsafeFilename {
                field,
                name: file.file_name.clone(),
            })
    };
    let origin = resolve(ORIGIN_FIELD, &pair.origin)?;
    let concat = resolve(CONCAT_FIELD, &pair.concat)?;

    tokio::fs::create_dir_all(dir.root()).await?;
    tokio::fs::write(&origin, &pair.origin.bytes).await?;
    tokio::fs::write(&concat, &pair.concat.bytes).await?;

    Ok(StoredPair { origin, concat })
}
