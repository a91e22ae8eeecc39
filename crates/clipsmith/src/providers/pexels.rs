use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

use super::{
    cache_path, download_to_cache, error_for_status, Downloaded, MediaItem, Orientation,
    StockProvider, SEARCH_TIMEOUT,
};
use crate::error::{DownloadError, ProviderError};

const PEXELS_SEARCH_URL: &str = "https://api.pexels.com/videos/search";
const MAX_PER_PAGE: usize = 15;

pub struct Pexels {
    api_key: Option<String>,
    client: reqwest::Client,
    cache_root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    id: u64,
    duration: Option<f64>,
    image: Option<String>,
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    quality: Option<String>,
    link: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl Video {
    /// hd, then sd, then whatever comes first.
    fn best_file(&self) -> Option<&VideoFile> {
        let by_quality = |q: &str| {
            self.video_files
                .iter()
                .find(|f| f.quality.as_deref() == Some(q))
        };
        by_quality("hd")
            .or_else(|| by_quality("sd"))
            .or_else(|| self.video_files.first())
    }

    fn into_item(self) -> Option<MediaItem> {
        let file = self.best_file()?;
        Some(MediaItem {
            id: self.id.to_string(),
            url: file.link.clone()?,
            width: file.width,
            height: file.height,
            duration: self.duration,
            thumbnail: self.image.clone(),
            source: "pexels".to_string(),
        })
    }
}

fn orientation_param(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Landscape => "landscape",
        Orientation::Portrait => "portrait",
        Orientation::Square => "square",
    }
}

fn parse_search(body: SearchResponse) -> Vec<MediaItem> {
    body.videos.into_iter().filter_map(Video::into_item).collect()
}

impl Pexels {
    pub fn new(api_key: Option<String>, client: reqwest::Client, cache_root: PathBuf) -> Self {
        Pexels {
            api_key,
            client,
            cache_root,
        }
    }
}

#[async_trait]
impl StockProvider for Pexels {
    fn name(&self) -> &'static str {
        "pexels"
    }

    async fn search(
        &self,
        query: &str,
        count: usize,
        orientation: Option<Orientation>,
    ) -> Result<Vec<MediaItem>, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::MissingKey {
            provider: "Pexels",
            env_var: "PEXELS_API_KEY",
        })?;

        let mut params = vec![
            ("query", query.to_string()),
            ("per_page", count.clamp(1, MAX_PER_PAGE).to_string()),
        ];
        if let Some(orientation) = orientation {
            params.push(("orientation", orientation_param(orientation).to_string()));
        }

        let response = self
            .client
            .get(PEXELS_SEARCH_URL)
            .header("Authorization", api_key)
            .query(&params)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "Pexels",
                source,
            })?;

        let body: SearchResponse = error_for_status("Pexels", response)
            .await?
            .json()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "Pexels",
                source,
            })?;

        let items = parse_search(body);
        debug!("Pexels returned {} video(s) for {:?}", items.len(), query);
        Ok(items)
    }

    async fn download(&self, url: &str, media_id: &str) -> Result<Downloaded, DownloadError> {
        let target = cache_path(&self.cache_root, self.name(), media_id, url)?;
        download_to_cache(&self.client, url, &target).await
    }
}
