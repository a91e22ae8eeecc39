use chrono::{DateTime, Utc};
use engine::learning::{
    Aspect, CategoryAverages, LearningStore, LowRatedAspect, Preference, LOW_RATING_THRESHOLD,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        Self::with_connection(Connection::open(db_path)?)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS generations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                topic TEXT NOT NULL,
                script TEXT,
                video_format TEXT,
                output_path TEXT,
                duration REAL,
                media_sources TEXT,
                status TEXT NOT NULL DEFAULT 'completed',
                metadata TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                generation_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                overall_score INTEGER NOT NULL CHECK(overall_score >= 1 AND overall_score <= 5),
                script_score INTEGER CHECK(script_score >= 1 AND script_score <= 5),
                visuals_score INTEGER CHECK(visuals_score >= 1 AND visuals_score <= 5),
                audio_score INTEGER CHECK(audio_score >= 1 AND audio_score <= 5),
                pacing_score INTEGER CHECK(pacing_score >= 1 AND pacing_score <= 5),
                feedback TEXT,
                FOREIGN KEY (generation_id) REFERENCES generations(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS preferences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                updated_at TEXT NOT NULL,
                preference_type TEXT NOT NULL,
                preference_key TEXT NOT NULL,
                preference_value TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0.5,
                UNIQUE(preference_type, preference_key)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ratings_generation ON ratings(generation_id)",
            [],
        )?;

        Ok(())
    }
}

/// A 1-5 score. Out-of-range values never reach the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub fn new(value: u8) -> Result<Self> {
        if (1..=5).contains(&value) {
            Ok(Score(value))
        } else {
            Err(StoreError::InvalidScore(value))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = StoreError;

    fn try_from(value: u8) -> Result<Self> {
        Score::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> u8 {
        score.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    #[default]
    Completed,
    Failed,
    Archived,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
            GenerationStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(GenerationStatus::Completed),
            "failed" => Ok(GenerationStatus::Failed),
            "archived" => Ok(GenerationStatus::Archived),
            other => Err(StoreError::InvalidColumn {
                column: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Where a clip in a generation came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    pub provider: String,
    pub media_id: String,
    pub query: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub topic: String,
    pub script_text: String,
    pub video_format: String,
    pub output_path: PathBuf,
    pub duration: f64,
    pub media_sources: Vec<MediaSource>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub topic: String,
    pub script_text: Option<String>,
    pub video_format: Option<String>,
    pub output_path: Option<String>,
    pub duration: Option<f64>,
    pub media_sources: Vec<MediaSource>,
    pub status: GenerationStatus,
    pub metadata: Option<serde_json::Value>,
}

const GENERATION_COLUMNS: &str = "g.id, g.created_at, g.topic, g.script, g.video_format, \
     g.output_path, g.duration, g.media_sources, g.status, g.metadata";

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<T>> {
    raw.map(|s| {
        serde_json::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

impl Generation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let created_at: String = row.get(1)?;
        let status: String = row.get(8)?;
        let status = status.parse::<GenerationStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Generation {
            id: row.get(0)?,
            created_at: parse_timestamp(1, &created_at)?,
            topic: row.get(2)?,
            script_text: row.get(3)?,
            video_format: row.get(4)?,
            output_path: row.get(5)?,
            duration: row.get(6)?,
            media_sources: parse_json(7, row.get(7)?)?.unwrap_or_default(),
            status,
            metadata: parse_json(9, row.get(9)?)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    #[serde(flatten)]
    pub generation: Generation,
    pub avg_rating: Option<f64>,
    pub rating_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRating {
    pub generation_id: i64,
    pub overall: Score,
    #[serde(default)]
    pub script: Option<Score>,
    #[serde(default)]
    pub visuals: Option<Score>,
    #[serde(default)]
    pub audio: Option<Score>,
    #[serde(default)]
    pub pacing: Option<Score>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl NewRating {
    pub fn new(generation_id: i64, overall: Score) -> Self {
        NewRating {
            generation_id,
            overall,
            script: None,
            visuals: None,
            audio: None,
            pacing: None,
            feedback: None,
        }
    }

    pub fn with_score(mut self, aspect: Aspect, score: Score) -> Self {
        match aspect {
            Aspect::Script => self.script = Some(score),
            Aspect::Visuals => self.visuals = Some(score),
            Aspect::Audio => self.audio = Some(score),
            Aspect::Pacing => self.pacing = Some(score),
        }
        self
    }
}

fn preference_from_row(row: &Row) -> rusqlite::Result<Preference> {
    let raw_type: String = row.get(0)?;
    let preference_type = raw_type.parse::<Aspect>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Preference {
        preference_type,
        preference_key: row.get(1)?,
        preference_value: row.get(2)?,
        confidence: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl Database {
    pub fn save_generation(&self, generation: &NewGeneration) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let media_sources = serde_json::to_string(&generation.media_sources)?;
        let metadata = generation
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO generations
             (created_at, topic, script, video_format, output_path, duration, media_sources, status, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                now,
                generation.topic,
                generation.script_text,
                generation.video_format,
                generation.output_path.to_string_lossy(),
                generation.duration,
                media_sources,
                GenerationStatus::Completed.as_str(),
                metadata,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns false when no generation has that id.
    pub fn update_generation_status(&self, id: i64, status: GenerationStatus) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE generations SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn get_generation(&self, id: i64) -> Result<Option<Generation>> {
        let conn = self.conn()?;
        let generation = conn
            .query_row(
                &format!("SELECT {} FROM generations g WHERE g.id = ?1", GENERATION_COLUMNS),
                params![id],
                Generation::from_row,
            )
            .optional()?;
        Ok(generation)
    }

    pub fn generation_exists(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row("SELECT 1 FROM generations WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_recent_generations(&self, limit: usize) -> Result<Vec<GenerationSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, AVG(r.overall_score), COUNT(r.id)
             FROM generations g
             LEFT JOIN ratings r ON g.id = r.generation_id
             GROUP BY g.id
             ORDER BY g.created_at DESC, g.id DESC
             LIMIT ?1",
            GENERATION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(GenerationSummary {
                generation: Generation::from_row(row)?,
                avg_rating: row.get(10)?,
                rating_count: row.get(11)?,
            })
        })?;

        let mut generations = Vec::new();
        for row in rows {
            generations.push(row?);
        }
        Ok(generations)
    }

    pub fn save_rating(&self, rating: &NewRating) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let score = |s: Option<Score>| s.map(|s| s.get());
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ratings
             (generation_id, created_at, overall_score, script_score, visuals_score,
              audio_score, pacing_score, feedback)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                rating.generation_id,
                now,
                rating.overall.get(),
                score(rating.script),
                score(rating.visuals),
                score(rating.audio),
                score(rating.pacing),
                rating.feedback,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_ratings_by_category(&self) -> Result<CategoryAverages> {
        let conn = self.conn()?;
        let averages = conn.query_row(
            "SELECT AVG(overall_score), AVG(script_score), AVG(visuals_score),
                    AVG(audio_score), AVG(pacing_score), COUNT(*)
             FROM ratings",
            [],
            |row| {
                Ok(CategoryAverages {
                    overall: row.get(0)?,
                    script: row.get(1)?,
                    visuals: row.get(2)?,
                    audio: row.get(3)?,
                    pacing: row.get(4)?,
                    total_ratings: row.get(5)?,
                })
            },
        )?;
        Ok(averages)
    }

    /// Insert or overwrite the preference keyed by (type, key).
    pub fn update_preference(&self, preference: &Preference) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO preferences (updated_at, preference_type, preference_key, preference_value, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(preference_type, preference_key)
             DO UPDATE SET
                preference_value = excluded.preference_value,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at",
            params![
                now,
                preference.preference_type.as_str(),
                preference.preference_key,
                preference.preference_value,
                preference.confidence,
            ],
        )?;
        Ok(())
    }

    /// Highest confidence first, optionally restricted to one aspect.
    pub fn get_preferences(&self, preference_type: Option<Aspect>) -> Result<Vec<Preference>> {
        let conn = self.conn()?;
        let base = "SELECT preference_type, preference_key, preference_value, confidence, updated_at
                    FROM preferences";
        let mut preferences = Vec::new();
        match preference_type {
            Some(aspect) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE preference_type = ?1 ORDER BY confidence DESC",
                    base
                ))?;
                for row in stmt.query_map(params![aspect.as_str()], preference_from_row)? {
                    preferences.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!("{} ORDER BY confidence DESC", base))?;
                for row in stmt.query_map([], preference_from_row)? {
                    preferences.push(row?);
                }
            }
        }
        Ok(preferences)
    }

    pub fn get_low_rated_aspects(&self, threshold: f64) -> Result<Vec<LowRatedAspect>> {
        let averages = self.get_ratings_by_category()?;
        Ok(Aspect::ALL
            .iter()
            .filter_map(|&aspect| {
                averages
                    .get(aspect)
                    .filter(|avg| *avg < threshold)
                    .map(|average_score| LowRatedAspect {
                        aspect,
                        average_score,
                    })
            })
            .collect())
    }
}

impl LearningStore for Database {
    type Error = StoreError;

    fn category_averages(&self) -> Result<CategoryAverages> {
        self.get_ratings_by_category()
    }

    fn upsert_preference(&self, preference: &Preference) -> Result<()> {
        self.update_preference(preference)
    }

    fn preferences(&self) -> Result<Vec<Preference>> {
        self.get_preferences(None)
    }
}

/// Default threshold for [`Database::get_low_rated_aspects`].
pub const DEFAULT_LOW_RATED_THRESHOLD: f64 = LOW_RATING_THRESHOLD;
