//! Stock footage search and cached download.

pub mod pexels;
pub mod pixabay;

use async_trait::async_trait;
use engine::compose::is_plain_name;
use engine::geometry::VideoFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DownloadError, ProviderError};

pub use pexels::Pexels;
pub use pixabay::Pixabay;

pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

impl Orientation {
    pub fn for_format(format: VideoFormat) -> Self {
        match format {
            VideoFormat::Horizontal => Orientation::Landscape,
            VideoFormat::Vertical => Orientation::Portrait,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Downloaded {
    pub file_path: PathBuf,
    pub cached: bool,
}

#[async_trait]
pub trait StockProvider: Send + Sync {
    /// Lowercase provider name, also used as the cache subdirectory and file prefix.
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        query: &str,
        count: usize,
        orientation: Option<Orientation>,
    ) -> Result<Vec<MediaItem>, ProviderError>;

    async fn download(&self, url: &str, media_id: &str) -> Result<Downloaded, DownloadError>;
}

/// `.mp4` unless the URL path ends in `.mov`.
pub fn extension_from_url(url: &str) -> &'static str {
    let path = url.split('?').next().unwrap_or(url);
    if path.ends_with(".mov") {
        ".mov"
    } else {
        ".mp4"
    }
}

/// `<cache_root>/<provider>/<provider>_<id><ext>`
pub fn cache_path(
    cache_root: &Path,
    provider: &str,
    media_id: &str,
    url: &str,
) -> Result<PathBuf, DownloadError> {
    if !is_plain_name(media_id) {
        return Err(DownloadError::InvalidMediaId(media_id.to_string()));
    }
    Ok(cache_root
        .join(provider)
        .join(format!("{}_{}{}", provider, media_id, extension_from_url(url))))
}

/// Fetch `url` into `target` unless it is already there. Partial downloads never
/// appear at `target`, and concurrent writers of one target each stream into
/// their own part file. The first to finish publishes; the rest report a cache hit.
pub async fn download_to_cache(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
) -> Result<Downloaded, DownloadError> {
    if tokio::fs::try_exists(target).await.unwrap_or(false) {
        debug!("Cache hit for {:?}", target);
        return Ok(Downloaded {
            file_path: target.to_path_buf(),
            cached: true,
        });
    }

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut response = client.get(url).timeout(DOWNLOAD_TIMEOUT).send().await?;
    if !response.status().is_success() {
        return Err(DownloadError::Status(response.status().as_u16()));
    }

    let partial = part_path(target);
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut written = 0usize;
    let streamed: Result<(), DownloadError> = async {
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;
        Ok(())
    }
    .await;
    drop(file);

    if let Err(err) = streamed {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err);
    }

    let published = publish(&partial, target).await;
    let _ = tokio::fs::remove_file(&partial).await;
    let cached = match published {
        Ok(()) => false,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            debug!("{:?} was cached by a concurrent download", target);
            true
        }
        Err(err) => return Err(err.into()),
    };

    if !cached {
        info!("Downloaded {} bytes to {:?}", written, target);
    }
    Ok(Downloaded {
        file_path: target.to_path_buf(),
        cached,
    })
}

/// `<target>.<uuid>.part`, next to the target so publishing never crosses filesystems.
fn part_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.part", Uuid::new_v4().simple()));
    target.with_file_name(name)
}

/// Link `partial` to `target` without replacing an existing file. Filesystems
/// without hard links fall back to a rename after an existence check.
async fn publish(partial: &Path, target: &Path) -> std::io::Result<()> {
    match tokio::fs::hard_link(partial, target).await {
        Err(err) if err.kind() != std::io::ErrorKind::AlreadyExists => {
            debug!("Hard link to {:?} failed ({}), renaming", target, err);
            if tokio::fs::try_exists(target).await.unwrap_or(false) {
                return Err(std::io::ErrorKind::AlreadyExists.into());
            }
            tokio::fs::rename(partial, target).await
        }
        other => other,
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("clipsmith/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub(crate) async fn error_for_status(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ProviderError::Status {
        provider,
        status: status.as_u16(),
        body,
    })
}
