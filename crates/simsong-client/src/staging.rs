//! Transient staging copy of an image.
//!
//! The upload is streamed from a named temporary file. The file lives exactly
//! as long as its [`StagedImage`]: it is deleted when the value is dropped,
//! which covers early returns, errors and cancelled futures.

use std::io;
use std::path::Path;
use std::sync::Arc;

use reqwest::multipart::Part;
use reqwest::Body;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{PredictError, PredictResult};
use crate::types::ImageSource;
use crate::upload::{body_stream, UploadProgress};

/// Media type sent for the `file` part.
pub const IMAGE_MIME: &str = "image/*";

const STAGING_PREFIX: &str = "upload";
const STAGING_SUFFIX: &str = ".jpg";

/// Image bytes copied to a temporary file for upload.
#[derive(Debug)]
pub struct StagedImage {
    file: NamedTempFile,
    file_name: String,
    len: u64,
}

impl StagedImage {
    /// Copy `source` into a new staging file under `dir` (OS temp dir if `None`).
    pub async fn stage(source: ImageSource, dir: Option<&Path>) -> PredictResult<Self> {
        match source {
            ImageSource::Path(path) => {
                let metadata = tokio::fs::metadata(&path)
                    .await
                    .map_err(|e| PredictError::read(format!("{}: {}", path.display(), e)))?;
                if !metadata.is_file() {
                    return Err(PredictError::read(format!(
                        "{}: not a regular file",
                        path.display()
                    )));
                }

                let mut src = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| PredictError::read(format!("{}: {}", path.display(), e)))?;

                let file = create_staging_file(dir)?;
                let mut dst = tokio::fs::File::from_std(file.reopen().map_err(PredictError::Staging)?);
                let len = tokio::io::copy(&mut src, &mut dst)
                    .await
                    .map_err(PredictError::Staging)?;
                dst.flush().await.map_err(PredictError::Staging)?;

                Self::finish(file, len)
            }
            ImageSource::Bytes { data, .. } => {
                let file = create_staging_file(dir)?;
                let mut dst = tokio::fs::File::from_std(file.reopen().map_err(PredictError::Staging)?);
                dst.write_all(&data).await.map_err(PredictError::Staging)?;
                dst.flush().await.map_err(PredictError::Staging)?;

                Self::finish(file, data.len() as u64)
            }
        }
    }

    fn finish(file: NamedTempFile, len: u64) -> PredictResult<Self> {
        let file_name = file
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}{}", STAGING_PREFIX, STAGING_SUFFIX));

        debug!("Staged {} bytes at {}", len, file.path().display());

        Ok(Self {
            file,
            file_name,
            len,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Multipart part streaming the staged bytes, reporting each chunk to `progress`.
    pub async fn to_part(&self, progress: Arc<UploadProgress>) -> PredictResult<Part> {
        let file = tokio::fs::File::open(self.path())
            .await
            .map_err(PredictError::Staging)?;

        let body = Body::wrap_stream(body_stream(file, self.len, progress));
        Part::stream_with_length(body, self.len)
            .file_name(self.file_name.clone())
            .mime_str(IMAGE_MIME)
            .map_err(PredictError::Transport)
    }

    /// Delete the staging file now, reporting failures.
    pub fn close(self) -> io::Result<()> {
        self.file.close()
    }
}

fn create_staging_file(dir: Option<&Path>) -> PredictResult<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(STAGING_PREFIX).suffix(STAGING_SUFFIX);

    let file = match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    };
    file.map_err(PredictError::Staging)
}
