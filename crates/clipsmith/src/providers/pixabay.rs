use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

use super::{
    cache_path, download_to_cache, error_for_status, Downloaded, MediaItem, Orientation,
    StockProvider, SEARCH_TIMEOUT,
};
use crate::error::{DownloadError, ProviderError};

const PIXABAY_VIDEO_URL: &str = "https://pixabay.com/api/videos/";
const MAX_PER_PAGE: usize = 20;
// The API rejects per_page below 3.
const MIN_PER_PAGE: usize = 3;

pub struct Pixabay {
    api_key: Option<String>,
    client: reqwest::Client,
    cache_root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    id: u64,
    duration: Option<f64>,
    picture_id: Option<String>,
    #[serde(default)]
    videos: Renditions,
}

#[derive(Debug, Default, Deserialize)]
struct Renditions {
    medium: Option<Rendition>,
    small: Option<Rendition>,
    tiny: Option<Rendition>,
}

#[derive(Debug, Deserialize)]
struct Rendition {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl Hit {
    fn into_item(self) -> Option<MediaItem> {
        let rendition = self
            .videos
            .medium
            .or(self.videos.small)
            .or(self.videos.tiny)?;
        let url = rendition.url.filter(|u| !u.is_empty())?;
        Some(MediaItem {
            id: self.id.to_string(),
            url,
            width: rendition.width,
            height: rendition.height,
            duration: self.duration,
            thumbnail: self.picture_id,
            source: "pixabay".to_string(),
        })
    }
}

fn orientation_param(orientation: Orientation) -> Option<&'static str> {
    match orientation {
        Orientation::Landscape => Some("horizontal"),
        Orientation::Portrait => Some("vertical"),
        Orientation::Square => None,
    }
}

fn parse_search(body: SearchResponse) -> Vec<MediaItem> {
    body.hits.into_iter().filter_map(Hit::into_item).collect()
}

impl Pixabay {
    pub fn new(api_key: Option<String>, client: reqwest::Client, cache_root: PathBuf) -> Self {
        Pixabay {
            api_key,
            client,
            cache_root,
        }
    }
}

#[async_trait]
impl StockProvider for Pixabay {
    fn name(&self) -> &'static str {
        "pixabay"
    }

    async fn search(
        &self,
        query: &str,
        count: usize,
        orientation: Option<Orientation>,
    ) -> Result<Vec<MediaItem>, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::MissingKey {
            provider: "Pixabay",
            env_var: "PIXABAY_API_KEY",
        })?;

        let mut params = vec![
            ("key", api_key.to_string()),
            ("q", query.to_string()),
            ("per_page", count.clamp(MIN_PER_PAGE, MAX_PER_PAGE).to_string()),
            ("safesearch", "true".to_string()),
        ];
        if let Some(value) = orientation.and_then(orientation_param) {
            params.push(("orientation", value.to_string()));
        }

        let response = self
            .client
            .get(PIXABAY_VIDEO_URL)
            .query(&params)
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "Pixabay",
                source,
            })?;

        let body: SearchResponse = error_for_status("Pixabay", response)
            .await?
            .json()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "Pixabay",
                source,
            })?;

        let mut items = parse_search(body);
        items.truncate(count.max(1));
        debug!("Pixabay returned {} video(s) for {:?}", items.len(), query);
        Ok(items)
    }

    async fn download(&self, url: &str, media_id: &str) -> Result<Downloaded, DownloadError> {
        let target = cache_path(&self.cache_root, self.name(), media_id, url)?;
        download_to_cache(&self.client, url, &target).await
    }
}
