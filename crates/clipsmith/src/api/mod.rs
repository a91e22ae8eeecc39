use axum::Router;
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::media::ffmpeg::FfmpegBackend;
use crate::pipeline::Pipeline;

pub mod feedback;
pub mod media;
pub mod render;

pub type SharedPipeline = Arc<Pipeline<FfmpegBackend>>;

/// Tool endpoints under `/tools`, plus the rendered videos under `/outputs`.
pub fn router(pipeline: SharedPipeline) -> Router {
    let outputs = ServeDir::new(&pipeline.settings().output_dir);
    Router::new()
        .nest(
            "/tools",
            Router::new()
                .merge(media::router(pipeline.clone()))
                .merge(render::router(pipeline.clone()))
                .merge(feedback::router(pipeline)),
        )
        .nest_service("/outputs", outputs)
}
