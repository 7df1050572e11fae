use std::{
    future::Future,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{backend::repo::part::MessagePart, config::Config};

pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload is empty")]
    Empty,
    #[error("upload is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stored attachment and where clients can fetch it from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: String,
    pub url: String,
    pub media_type: String,
    pub filename: Option<String>,
    pub size: usize,
}

impl StoredFile {
    pub fn into_part(self) -> MessagePart {
        MessagePart::File {
            media_type: self.media_type,
            url: self.url,
            filename: self.filename,
        }
    }
}

pub trait FileStore: Send + Sync + 'static {
    fn store(
        &self,
        filename: Option<&str>,
        media_type: &str,
        bytes: &[u8],
    ) -> impl Future<Output = Result<StoredFile, UploadError>> + Send;
}

/// Writes uploads into a directory that is served under `public_base_url`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
    public_base_url: String,
    max_bytes: usize,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.upload_dir.clone(), config.upload_base_url.clone())
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Keeps the extension of the client's filename if it is plain ascii, nothing else of it.
fn stored_name(id: &str, filename: Option<&str>) -> String {
    let extension = filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase);

    match extension {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

impl FileStore for LocalFileStore {
    async fn store(
        &self,
        filename: Option<&str>,
        media_type: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        let id = Uuid::new_v4().to_string();
        let name = stored_name(&id, filename);
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&name), bytes).await?;
        log::debug!("stored upload {name} ({} bytes)", bytes.len());

        Ok(StoredFile {
            id,
            url: format!("{}/{name}", self.public_base_url),
            media_type: media_type.to_string(),
            filename: filename.map(str::to_string),
            size: bytes.len(),
        })
    }
}
