//! Persistent on-disk artwork cache.
//!
//! Each image kind has its own directory under the cache root and every entry
//! is a file named `<item id>.<ext>`. Entries are written once and never
//! refreshed or evicted.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::jellyfin::ImageKind;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("no {0} image available")]
    NotAvailable(&'static str),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("cached file {path} unreadable: {source}")]
    Unreadable { path: PathBuf, source: io::Error },

    #[error("could not persist {path}: {source}")]
    Persist { path: PathBuf, source: io::Error },

    #[error("invalid cache key {0:?}")]
    InvalidKey(String),
}

/// Deterministic cache identity: one artwork variant of one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: ImageKind,
    pub item_id: String,
}

impl CacheKey {
    pub fn new(kind: ImageKind, item_id: impl Into<String>) -> Self {
        Self {
            kind,
            item_id: item_id.into(),
        }
    }

    /// File name of the entry inside its kind directory.
    pub fn file_name(&self) -> Result<String, ImageError> {
        let id = self.item_id.as_str();
        if id.is_empty() || id == "." || id.contains("..") || id.contains(['/', '\\']) {
            return Err(ImageError::InvalidKey(self.item_id.clone()));
        }
        Ok(format!("{}.{}", id, self.kind.extension()))
    }
}

/// Where the bytes of a successful lookup came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Cache,
    Network,
}

#[derive(Debug, Clone)]
pub struct CachedImage {
    pub bytes: Vec<u8>,
    pub source: ImageSource,
}

/// Artwork cache backed by the filesystem.
#[derive(Debug, Clone)]
pub struct ImageCache {
    root: PathBuf,
    client: Client,
    timeout: Duration,
}

impl ImageCache {
    /// Open the cache rooted at `root`, creating the kind directories.
    pub async fn open(root: impl Into<PathBuf>, client: Client, timeout: Duration) -> io::Result<Self> {
        let root = root.into();
        for kind in ImageKind::ALL {
            fs::create_dir_all(root.join(kind.cache_dir())).await?;
        }

        debug!(root = %root.display(), "image_cache_opened");

        Ok(Self { root, client, timeout })
    }

    /// Location of an entry on disk.
    pub fn path_for(&self, key: &CacheKey) -> Result<PathBuf, ImageError> {
        Ok(self.root.join(key.kind.cache_dir()).join(key.file_name()?))
    }

    /// Return the cached bytes for `key`, downloading `url` on a miss.
    ///
    /// A download is persisted before its bytes are returned. Failed downloads
    /// leave nothing behind, so the next call retries the network.
    pub async fn fetch_or_load(
        &self,
        url: &str,
        key: &CacheKey,
        headers: &HeaderMap,
    ) -> Result<CachedImage, ImageError> {
        let path = self.path_for(key)?;

        let exists = match fs::try_exists(&path).await {
            Ok(exists) => exists,
            Err(source) => return Err(ImageError::Unreadable { path, source }),
        };

        if exists {
            info!(path = %path.display(), "image_cache_hit");
            let bytes = fs::read(&path)
                .await
                .map_err(|source| ImageError::Unreadable { path, source })?;
            return Ok(CachedImage {
                bytes,
                source: ImageSource::Cache,
            });
        }

        info!(url = url, kind = key.kind.label(), "image_download_starting");

        let bytes = self.download(url, key.kind, headers).await?;
        persist(&path, &bytes).await?;

        info!(
            path = %path.display(),
            size = bytes.len(),
            "image_download_cached"
        );

        Ok(CachedImage {
            bytes,
            source: ImageSource::Network,
        })
    }

    async fn download(
        &self,
        url: &str,
        kind: ImageKind,
        headers: &HeaderMap,
    ) -> Result<Vec<u8>, ImageError> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ImageError::Request)?;

        match response.status() {
            status if status.is_success() => {}
            status if status == StatusCode::NOT_FOUND => return Err(ImageError::NotAvailable(kind.label())),
            status => return Err(ImageError::Status(status)),
        }

        let body = response.bytes().await.map_err(ImageError::Request)?;
        Ok(body.to_vec())
    }
}

/// Write `bytes` to a sibling temp file and move it into place.
async fn persist(path: &Path, bytes: &[u8]) -> Result<(), ImageError> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let result = match fs::write(&partial, bytes).await {
        Ok(()) => fs::rename(&partial, path).await,
        Err(e) => Err(e),
    };

    if let Err(source) = result {
        if let Err(e) = fs::remove_file(&partial).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %partial.display(), error = %e, "image_cache_cleanup_failed");
            }
        }
        return Err(ImageError::Persist {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}
