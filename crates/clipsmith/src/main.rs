use anyhow::{bail, Context};
use axum::{response::Json, routing::get, Router};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use engine::geometry::VideoFormat;
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, level_filters::LevelFilter, warn};

mod api;
mod config;
mod db;
mod error;
mod gemini;
mod llm;
mod media;
mod pipeline;
mod providers;
mod tts;

use config::Config;
use db::{Database, GenerationStatus, NewRating, Score, DEFAULT_LOW_RATED_THRESHOLD};
use engine::learning::Aspect;
use gemini::GeminiClient;
use llm::GeminiWriter;
use media::ffmpeg::FfmpegBackend;
use pipeline::{GenerateRequest, Mode, Pipeline, PipelineSettings, RatingOutcome};
use providers::{http_client, Pexels, Pixabay, StockProvider};
use tts::GeminiTts;

#[derive(Parser)]
#[command(name = "clipsmith")]
#[command(about = "Generate short stock-footage videos from a topic and learn from ratings", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a video
    Generate {
        /// Video topic, or a full script with [Visual: ...] markers
        #[arg(short, long)]
        topic: String,

        /// Output file name (without extension)
        #[arg(short, long, default_value = "generated_video")]
        output: String,

        /// horizontal (16:9) or vertical (9:16); defaults to DEFAULT_VIDEO_FORMAT
        #[arg(short, long)]
        format: Option<VideoFormat>,

        /// single or sequential
        #[arg(short, long, default_value = "single")]
        mode: Mode,
    },

    /// Rate a generated video
    Rate {
        /// Generation ID to rate
        #[arg(short, long)]
        id: i64,

        /// Overall rating (1-5)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=5))]
        overall: u8,

        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        script: Option<u8>,

        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        visuals: Option<u8>,

        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        audio: Option<u8>,

        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        pacing: Option<u8>,

        /// Optional text feedback
        #[arg(long)]
        feedback: Option<String>,
    },

    /// Show generation history
    History {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show learned preferences
    Learnings,

    /// Mark a generation as archived
    Archive {
        #[arg(short, long)]
        id: i64,
    },

    /// Serve the tool API
    Serve {
        #[arg(long, default_value = "127.0.0.1:7777")]
        addr: SocketAddr,
    },
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline<FfmpegBackend>> {
    config.ensure_dirs().context("creating output/cache/data directories")?;

    let db_path = config.database_path();
    let db = Arc::new(Database::new(&db_path)?);
    info!("Database initialized at {:?}", db_path);

    let http = http_client();
    let gemini = GeminiClient::new(config.google_api_key.clone(), http.clone());
    let providers: Vec<Arc<dyn StockProvider>> = vec![
        Arc::new(Pexels::new(config.pexels_api_key.clone(), http.clone(), config.video_cache_dir())),
        Arc::new(Pixabay::new(config.pixabay_api_key.clone(), http, config.video_cache_dir())),
    ];

    Ok(Pipeline::new(
        db,
        Arc::new(GeminiWriter::new(gemini.clone(), config.llm_model.clone())),
        providers,
        Arc::new(GeminiTts::new(
            gemini,
            config.tts.voice.clone(),
            config.tts.speed,
            config.audio_cache_dir(),
        )),
        FfmpegBackend::new(),
        PipelineSettings::from_config(config),
    ))
}

async fn generate(
    pipeline: &Pipeline<FfmpegBackend>,
    config: &Config,
    request: GenerateRequest,
) -> anyhow::Result<()> {
    let missing = config.validate();
    if !missing.is_empty() {
        for err in &missing {
            eprintln!("Configuration error: {}", err);
        }
        bail!("{} required setting(s) missing; see .env", missing.len());
    }

    let report = pipeline.generate(&request).await?;
    let open = pipeline.backend().open_handles();
    if open > 0 {
        warn!("{} media handle(s) were not released", open);
    }
    println!("Video generation completed");
    println!("   Output: {}", report.output_path.display());
    println!("   Duration: {:.1}s from {} clip(s)", report.duration, report.clips_used);
    if report.segments_skipped > 0 {
        println!("   Segments without footage: {}", report.segments_skipped);
    }
    println!("   Generation ID: {} (use for rating)", report.generation_id);
    Ok(())
}

fn rate(pipeline: &Pipeline<FfmpegBackend>, rating: NewRating) -> anyhow::Result<()> {
    let generation_id = rating.generation_id;
    match pipeline.submit_rating(&rating)? {
        RatingOutcome::GenerationNotFound { .. } => {
            println!("Generation ID {} not found", generation_id);
        }
        RatingOutcome::Saved { rating_id, .. } => {
            println!("Rating saved (ID: {})", rating_id);
            println!("   Overall: {}/5", rating.overall.get());
            for aspect in Aspect::ALL {
                let score = match aspect {
                    Aspect::Script => rating.script,
                    Aspect::Visuals => rating.visuals,
                    Aspect::Audio => rating.audio,
                    Aspect::Pacing => rating.pacing,
                };
                if let Some(score) = score {
                    println!("   {}: {}/5", aspect, score.get());
                }
            }

            let summary = pipeline.learning_summary()?;
            if !summary.learned_preferences.is_empty() {
                println!("\nLearned preferences:");
                for pref in &summary.learned_preferences {
                    println!("   - {}", pref.preference);
                }
            }
            println!("\nSuggestions:");
            for suggestion in pipeline.improvement_suggestions(generation_id)? {
                println!("   - {}", suggestion);
            }
        }
    }
    Ok(())
}

fn history(pipeline: &Pipeline<FfmpegBackend>, limit: usize) -> anyhow::Result<()> {
    let generations = pipeline.db().get_recent_generations(limit)?;
    if generations.is_empty() {
        println!("No generations found.");
        return Ok(());
    }
    println!("Recent generations:");
    for summary in generations {
        let g = &summary.generation;
        let rating = match summary.avg_rating {
            Some(avg) => format!("{:.1}/5 ({} rating(s))", avg, summary.rating_count),
            None => "Not rated".to_string(),
        };
        println!("   [{}] {} ({})", g.id, g.topic, g.created_at.format("%Y-%m-%d %H:%M"));
        println!(
            "      Format: {} | {} | {}",
            g.video_format.as_deref().unwrap_or("-"),
            g.status,
            rating
        );
    }
    Ok(())
}

fn learnings(pipeline: &Pipeline<FfmpegBackend>) -> anyhow::Result<()> {
    let summary = pipeline.learning_summary()?;
    println!("Total rated generations: {}", summary.total_generations_rated);
    if !summary.category_performance.is_empty() {
        println!("\nCategory performance:");
        for perf in &summary.category_performance {
            let status = match perf.status {
                engine::learning::CategoryStatus::Good => "good",
                engine::learning::CategoryStatus::NeedsImprovement => "needs improvement",
            };
            println!("   {}: {:.2} ({})", perf.aspect, perf.average, status);
        }
    }
    if summary.learned_preferences.is_empty() {
        println!("\nNo learned preferences yet. Rate a few videos first.");
    } else {
        println!("\nLearned preferences:");
        for pref in &summary.learned_preferences {
            println!("   - [{}] {} (confidence {:.2})", pref.preference_type, pref.preference, pref.confidence);
        }
    }
    let low = pipeline.db().get_low_rated_aspects(DEFAULT_LOW_RATED_THRESHOLD)?;
    if !low.is_empty() {
        let areas: Vec<String> = low
            .iter()
            .map(|l| format!("{} ({:.2})", l.aspect, l.average_score))
            .collect();
        println!("\nImprovement areas: {}", areas.join(", "));
    }
    Ok(())
}

async fn serve(pipeline: Pipeline<FfmpegBackend>, config: &Config, addr: SocketAddr) -> anyhow::Result<()> {
    for err in config.validate() {
        warn!("{}; tools that need it will report a config error", err);
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    let app = Router::new()
        .route("/health", get(health))
        .merge(api::router(Arc::new(pipeline)))
        .layer(cors);

    info!("Starting tool server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn score(value: Option<u8>) -> anyhow::Result<Option<Score>> {
    Ok(value.map(Score::new).transpose()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        })
        .init();

    let config = Config::from_env()?;
    let pipeline = build_pipeline(&config)?;

    match cli.command {
        Commands::Generate {
            topic,
            output,
            format,
            mode,
        } => {
            let request = GenerateRequest {
                topic,
                output_name: output,
                format,
                mode,
            };
            generate(&pipeline, &config, request).await
        }
        Commands::Rate {
            id,
            overall,
            script,
            visuals,
            audio,
            pacing,
            feedback,
        } => {
            let mut rating = NewRating::new(id, Score::new(overall)?);
            rating.script = score(script)?;
            rating.visuals = score(visuals)?;
            rating.audio = score(audio)?;
            rating.pacing = score(pacing)?;
            rating.feedback = feedback;
            rate(&pipeline, rating)
        }
        Commands::History { limit } => history(&pipeline, limit),
        Commands::Learnings => learnings(&pipeline),
        Commands::Archive { id } => {
            if pipeline.db().update_generation_status(id, GenerationStatus::Archived)? {
                println!("Generation {} archived", id);
            } else {
                println!("Generation ID {} not found", id);
            }
            Ok(())
        }
        Commands::Serve { addr } => serve(pipeline, &config, addr).await,
    }
}
