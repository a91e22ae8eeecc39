use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use engine::learning::{Aspect, Insights, LearningSummary};
use serde::{Deserialize, Serialize};

use super::SharedPipeline;
use crate::db::{GenerationSummary, NewRating, Score};
use crate::error::{ErrorKind, StoreError, ToolResult};
use crate::pipeline::{PipelineError, RatingOutcome, GENERATION_NOT_FOUND};

const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Scores arrive as plain integers so out-of-range values are reported as
/// tool errors instead of JSON rejections.
#[derive(Debug, Deserialize)]
pub struct SaveRatingRequest {
    pub generation_id: i64,
    pub overall: u8,
    #[serde(default)]
    pub script: Option<u8>,
    #[serde(default)]
    pub visuals: Option<u8>,
    #[serde(default)]
    pub audio: Option<u8>,
    #[serde(default)]
    pub pacing: Option<u8>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl SaveRatingRequest {
    fn into_rating(self) -> Result<NewRating, StoreError> {
        let mut rating = NewRating::new(self.generation_id, Score::new(self.overall)?);
        for (aspect, score) in [
            (Aspect::Script, self.script),
            (Aspect::Visuals, self.visuals),
            (Aspect::Audio, self.audio),
            (Aspect::Pacing, self.pacing),
        ] {
            if let Some(score) = score {
                rating = rating.with_score(aspect, Score::new(score)?);
            }
        }
        rating.feedback = self.feedback.filter(|f| !f.trim().is_empty());
        Ok(rating)
    }
}

#[derive(Debug, Serialize)]
pub struct SaveRatingResponse {
    pub rating_id: i64,
    pub insights: Insights,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub generations: Vec<GenerationSummary>,
}

pub fn router(pipeline: SharedPipeline) -> Router {
    Router::new()
        .route("/save_rating", post(save_rating))
        .route("/learned_preferences", get(learned_preferences))
        .route("/history", get(history))
        .with_state(pipeline)
}

async fn save_rating(
    State(pipeline): State<SharedPipeline>,
    Json(req): Json<SaveRatingRequest>,
) -> ToolResult<SaveRatingResponse> {
    let rating = match req.into_rating() {
        Ok(rating) => rating,
        Err(err) => return Err::<SaveRatingResponse, _>(err).into(),
    };
    let saved = pipeline.submit_rating(&rating).and_then(|outcome| match outcome {
        RatingOutcome::Saved { rating_id, insights } => {
            let suggestions = pipeline.improvement_suggestions(rating.generation_id)?;
            Ok(Some(SaveRatingResponse {
                rating_id,
                insights,
                suggestions,
            }))
        }
        RatingOutcome::GenerationNotFound { .. } => Ok(None),
    });
    match saved {
        Ok(Some(response)) => ToolResult::Success(response),
        Ok(None) => ToolResult::error(ErrorKind::NotFound, GENERATION_NOT_FOUND),
        Err(err) => Err::<SaveRatingResponse, PipelineError>(err).into(),
    }
}

async fn learned_preferences(State(pipeline): State<SharedPipeline>) -> ToolResult<LearningSummary> {
    pipeline.learning_summary().into()
}

async fn history(
    State(pipeline): State<SharedPipeline>,
    Query(query): Query<HistoryQuery>,
) -> ToolResult<HistoryResponse> {
    pipeline
        .db()
        .get_recent_generations(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .map(|generations| HistoryResponse { generations })
        .into()
}
