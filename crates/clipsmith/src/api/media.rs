use axum::{extract::State, response::Json, routing::post, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::SharedPipeline;
use crate::error::{ErrorKind, ToolResult};
use crate::pipeline::SEARCH_COUNT;
use crate::providers::{Downloaded, MediaItem, Orientation};

const DEFAULT_PROVIDER: &str = "pexels";

#[derive(Debug, Deserialize)]
pub struct SearchMediaRequest {
    pub query: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub orientation: Option<Orientation>,
}

#[derive(Debug, Serialize)]
pub struct SearchMediaResponse {
    pub provider: String,
    pub query: String,
    pub total_results: usize,
    pub videos: Vec<MediaItem>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadMediaRequest {
    pub provider: String,
    pub url: String,
    pub media_id: String,
}

pub fn router(pipeline: SharedPipeline) -> Router {
    Router::new()
        .route("/search_media", post(search_media))
        .route("/download_media", post(download_media))
        .with_state(pipeline)
}

fn unknown_provider<T>(name: &str) -> ToolResult<T> {
    ToolResult::error(ErrorKind::InvalidInput, format!("Unknown media provider: {}", name))
}

async fn search_media(
    State(pipeline): State<SharedPipeline>,
    Json(req): Json<SearchMediaRequest>,
) -> ToolResult<SearchMediaResponse> {
    if req.query.trim().is_empty() {
        return ToolResult::error(ErrorKind::InvalidInput, "query must not be empty");
    }
    let name = req.provider.as_deref().unwrap_or(DEFAULT_PROVIDER);
    let Some(provider) = pipeline.provider(name) else {
        return unknown_provider(name);
    };

    provider
        .search(&req.query, req.count.unwrap_or(SEARCH_COUNT), req.orientation)
        .await
        .map(|videos| SearchMediaResponse {
            provider: provider.name().to_string(),
            query: req.query.clone(),
            total_results: videos.len(),
            videos,
        })
        .into()
}

async fn download_media(
    State(pipeline): State<SharedPipeline>,
    Json(req): Json<DownloadMediaRequest>,
) -> ToolResult<Downloaded> {
    let Some(provider) = pipeline.provider(&req.provider) else {
        return unknown_provider(&req.provider);
    };
    let result = provider.download(&req.url, &req.media_id).await;
    if let Ok(downloaded) = &result {
        info!(
            "{} media {} at {:?} (cached: {})",
            provider.name(),
            req.media_id,
            downloaded.file_path,
            downloaded.cached
        );
    }
    result.into()
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::api::tests::{app, call};
    use crate::pipeline::testing::{harness, FakeProvider, FakeWriter};

    fn stocked() -> axum::Router {
        app(harness(
            FakeWriter::default(),
            FakeProvider::new("pexels", vec![("ocean waves", vec!["3", "4"])]),
            FakeProvider::new("pixabay", vec![("ocean waves", vec!["90"])]),
        ))
    }

    #[tokio::test]
    async fn searches_pexels_by_default() {
        let (status, body) = call(
            &stocked(),
            Method::POST,
            "/tools/search_media",
            Some(json!({"query": "ocean waves"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["provider"], "pexels");
        assert_eq!(body["total_results"], 2);
        assert_eq!(body["videos"][0]["url"], "https://pexels/3.mp4");
    }

    #[tokio::test]
    async fn provider_is_selectable_and_validated() {
        let app = stocked();
        let (_, body) = call(
            &app,
            Method::POST,
            "/tools/search_media",
            Some(json!({"query": "ocean waves", "provider": "Pixabay", "orientation": "portrait"})),
        )
        .await;
        assert_eq!(body["videos"][0]["id"], "90");

        let (status, body) = call(
            &app,
            Method::POST,
            "/tools/search_media",
            Some(json!({"query": "ocean waves", "provider": "vimeo"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");
        assert_eq!(body["error_message"], "Unknown media provider: vimeo");
    }

    #[tokio::test]
    async fn download_returns_cache_path() {
        let (status, body) = call(
            &stocked(),
            Method::POST,
            "/tools/download_media",
            Some(json!({"provider": "pexels", "url": "https://pexels/3.mp4", "media_id": "3"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["file_path"], "cache/videos/pexels/pexels_3.mp4");
        assert_eq!(body["cached"], false);
    }

    #[tokio::test]
    async fn media_id_cannot_leave_the_cache() {
        let (status, body) = call(
            &stocked(),
            Method::POST,
            "/tools/download_media",
            Some(json!({"provider": "pexels", "url": "https://pexels/3.mp4", "media_id": "../../../etc/x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");
        assert_eq!(body["error_message"], "Invalid media id \"../../../etc/x\"");
    }
}
