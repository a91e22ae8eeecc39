//! Rating-driven preference learning.
//!
//! Ratings are reduced to per-category averages. Categories averaging below
//! [`LOW_RATING_THRESHOLD`] produce a recommendation and a preference whose
//! confidence grows as the average falls. Preferences at or above
//! [`MIN_SURFACED_CONFIDENCE`] are rendered as hints appended to prompts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::geometry::ParseEnumError;

/// Ratings required before any recommendation is emitted.
pub const MIN_RATINGS_FOR_RECOMMENDATIONS: i64 = 3;
pub const LOW_RATING_THRESHOLD: f64 = 3.5;
pub const MIN_SURFACED_CONFIDENCE: f64 = 0.5;

const CONFIDENCE_PER_POINT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aspect {
    Script,
    Visuals,
    Audio,
    Pacing,
}

impl Aspect {
    pub const ALL: [Aspect; 4] = [Aspect::Script, Aspect::Visuals, Aspect::Audio, Aspect::Pacing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aspect::Script => "script",
            Aspect::Visuals => "visuals",
            Aspect::Audio => "audio",
            Aspect::Pacing => "pacing",
        }
    }

    fn derivation(&self) -> Derivation {
        match self {
            Aspect::Script => Derivation {
                key: "style",
                value: "more_engaging",
                issue: "Scripts receiving lower ratings",
                suggestion: "Focus on more engaging hooks and clearer structure",
            },
            Aspect::Visuals => Derivation {
                key: "quality",
                value: "higher_quality",
                issue: "Visual selection needs improvement",
                suggestion: "Search for more specific, high-quality footage",
            },
            Aspect::Audio => Derivation {
                key: "style",
                value: "clearer_speech",
                issue: "Audio/voiceover quality concerns",
                suggestion: "Adjust speaking speed or use different voice style",
            },
            Aspect::Pacing => Derivation {
                key: "speed",
                value: "moderate",
                issue: "Pacing issues detected",
                suggestion: "Adjust clip durations and transitions",
            },
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aspect {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "script" => Ok(Aspect::Script),
            "visuals" => Ok(Aspect::Visuals),
            "audio" => Ok(Aspect::Audio),
            "pacing" => Ok(Aspect::Pacing),
            _ => Err(ParseEnumError::new("preference type", s)),
        }
    }
}

struct Derivation {
    key: &'static str,
    value: &'static str,
    issue: &'static str,
    suggestion: &'static str,
}

/// Which hints a prompt wants: one aspect's, or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptType {
    #[default]
    General,
    Script,
    Visuals,
    Audio,
    Pacing,
}

impl PromptType {
    pub fn accepts(&self, aspect: Aspect) -> bool {
        match self {
            PromptType::General => true,
            PromptType::Script => aspect == Aspect::Script,
            PromptType::Visuals => aspect == Aspect::Visuals,
            PromptType::Audio => aspect == Aspect::Audio,
            PromptType::Pacing => aspect == Aspect::Pacing,
        }
    }
}

impl FromStr for PromptType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("general") {
            return Ok(PromptType::General);
        }
        match s.parse::<Aspect>() {
            Ok(Aspect::Script) => Ok(PromptType::Script),
            Ok(Aspect::Visuals) => Ok(PromptType::Visuals),
            Ok(Aspect::Audio) => Ok(PromptType::Audio),
            Ok(Aspect::Pacing) => Ok(PromptType::Pacing),
            Err(_) => Err(ParseEnumError::new("prompt type", s)),
        }
    }
}

/// Scores from a single rating. Category scores are optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingScores {
    pub overall: u8,
    pub script: Option<u8>,
    pub visuals: Option<u8>,
    pub audio: Option<u8>,
    pub pacing: Option<u8>,
}

impl RatingScores {
    pub fn get(&self, aspect: Aspect) -> Option<u8> {
        match aspect {
            Aspect::Script => self.script,
            Aspect::Visuals => self.visuals,
            Aspect::Audio => self.audio,
            Aspect::Pacing => self.pacing,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryAverages {
    pub total_ratings: i64,
    pub overall: Option<f64>,
    pub script: Option<f64>,
    pub visuals: Option<f64>,
    pub audio: Option<f64>,
    pub pacing: Option<f64>,
}

fn mean(values: impl Iterator<Item = u8>) -> Option<f64> {
    let (sum, count) = values.fold((0u64, 0u64), |(s, c), v| (s + v as u64, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum as f64 / count as f64)
    }
}

impl CategoryAverages {
    /// Averages skip missing scores, the same way SQL `AVG` skips NULLs.
    pub fn from_ratings(ratings: &[RatingScores]) -> Self {
        CategoryAverages {
            total_ratings: ratings.len() as i64,
            overall: mean(ratings.iter().map(|r| r.overall)),
            script: mean(ratings.iter().filter_map(|r| r.script)),
            visuals: mean(ratings.iter().filter_map(|r| r.visuals)),
            audio: mean(ratings.iter().filter_map(|r| r.audio)),
            pacing: mean(ratings.iter().filter_map(|r| r.pacing)),
        }
    }

    pub fn get(&self, aspect: Aspect) -> Option<f64> {
        match aspect {
            Aspect::Script => self.script,
            Aspect::Visuals => self.visuals,
            Aspect::Audio => self.audio,
            Aspect::Pacing => self.pacing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub preference_type: Aspect,
    pub preference_key: String,
    pub preference_value: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Preference {
    pub fn is_surfaced(&self) -> bool {
        self.confidence >= MIN_SURFACED_CONFIDENCE
    }

    pub fn hint(&self) -> Option<&'static str> {
        hint_for(self.preference_type, &self.preference_value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub aspect: Aspect,
    pub issue: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowRatedAspect {
    pub aspect: Aspect,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub total_ratings: i64,
    pub category_averages: CategoryAverages,
    pub low_rated_aspects: Vec<LowRatedAspect>,
    pub recommendations: Vec<Recommendation>,
}

/// Insights plus the preferences they imply.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub insights: Insights,
    pub preferences: Vec<Preference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPerformance {
    pub aspect: Aspect,
    pub average: f64,
    pub status: CategoryStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    Good,
    NeedsImprovement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPreference {
    #[serde(rename = "type")]
    pub preference_type: Aspect,
    pub preference: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSummary {
    pub total_generations_rated: i64,
    pub category_performance: Vec<CategoryPerformance>,
    pub learned_preferences: Vec<LearnedPreference>,
    pub improvement_areas: Vec<Aspect>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Confidence for a category average below the threshold. Clamped to [0, 1];
/// with 1-5 scores the result stays within 0.5..=0.75.
pub fn confidence_for(average: f64) -> f64 {
    (MIN_SURFACED_CONFIDENCE + (LOW_RATING_THRESHOLD - average) * CONFIDENCE_PER_POINT)
        .clamp(0.0, 1.0)
}

pub fn hint_for(aspect: Aspect, value: &str) -> Option<&'static str> {
    match (aspect, value) {
        (Aspect::Script, "more_engaging") => {
            Some("Focus on creating highly engaging, hook-driven content")
        }
        (Aspect::Visuals, "higher_quality") => {
            Some("Prioritize high-quality, professional-looking footage")
        }
        (Aspect::Audio, "clearer_speech") => Some("Ensure clear, well-paced narration"),
        (Aspect::Pacing, "moderate") => Some("Use moderate pacing with smooth transitions"),
        _ => None,
    }
}

pub fn low_rated_aspects(averages: &CategoryAverages) -> Vec<LowRatedAspect> {
    Aspect::ALL
        .iter()
        .filter_map(|&aspect| {
            averages
                .get(aspect)
                .filter(|avg| *avg < LOW_RATING_THRESHOLD)
                .map(|average_score| LowRatedAspect {
                    aspect,
                    average_score,
                })
        })
        .collect()
}

/// Derive insights and preferences from category averages. Pure.
pub fn analyze(averages: &CategoryAverages) -> Analysis {
    let low = low_rated_aspects(averages);
    let mut recommendations = Vec::new();
    let mut preferences = Vec::new();

    if averages.total_ratings >= MIN_RATINGS_FOR_RECOMMENDATIONS {
        for entry in &low {
            let derivation = entry.aspect.derivation();
            recommendations.push(Recommendation {
                aspect: entry.aspect,
                issue: derivation.issue.to_string(),
                suggestion: derivation.suggestion.to_string(),
            });
            preferences.push(Preference {
                preference_type: entry.aspect,
                preference_key: derivation.key.to_string(),
                preference_value: derivation.value.to_string(),
                confidence: confidence_for(entry.average_score),
                updated_at: None,
            });
        }
    }

    Analysis {
        insights: Insights {
            total_ratings: averages.total_ratings,
            category_averages: averages.clone(),
            low_rated_aspects: low,
            recommendations,
        },
        preferences,
    }
}

/// Append hints for every surfaced preference that matches `prompt_type`.
pub fn enhance_prompt(base_prompt: &str, prompt_type: PromptType, preferences: &[Preference]) -> String {
    let hints: Vec<&str> = preferences
        .iter()
        .filter(|p| p.is_surfaced() && prompt_type.accepts(p.preference_type))
        .filter_map(Preference::hint)
        .collect();

    if hints.is_empty() {
        return base_prompt.to_string();
    }

    let mut enhanced = String::from(base_prompt);
    enhanced.push_str("\n\nLEARNED PREFERENCES (apply these based on past feedback):\n");
    enhanced.push_str(
        &hints
            .iter()
            .map(|h| format!("- {}", h))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    enhanced
}

pub fn summarize(averages: &CategoryAverages, preferences: &[Preference]) -> LearningSummary {
    let category_performance = Aspect::ALL
        .iter()
        .filter_map(|&aspect| {
            averages.get(aspect).map(|avg| CategoryPerformance {
                aspect,
                average: round2(avg),
                status: if avg >= LOW_RATING_THRESHOLD {
                    CategoryStatus::Good
                } else {
                    CategoryStatus::NeedsImprovement
                },
            })
        })
        .collect();

    let learned_preferences = preferences
        .iter()
        .filter(|p| p.is_surfaced())
        .map(|p| LearnedPreference {
            preference_type: p.preference_type,
            preference: format!("{}: {}", p.preference_key, p.preference_value),
            confidence: round2(p.confidence),
        })
        .collect();

    LearningSummary {
        total_generations_rated: averages.total_ratings,
        category_performance,
        learned_preferences,
        improvement_areas: low_rated_aspects(averages)
            .into_iter()
            .map(|l| l.aspect)
            .collect(),
    }
}

/// Advice for a single generation, based on the global averages.
pub fn improvement_suggestions(averages: &CategoryAverages) -> Vec<String> {
    let mut suggestions = Vec::new();
    if averages.total_ratings > 0 {
        let low = |aspect| {
            averages
                .get(aspect)
                .map_or(false, |avg| avg < LOW_RATING_THRESHOLD)
        };
        if low(Aspect::Script) {
            suggestions
                .push("Consider using stronger hooks and more varied content structure".to_string());
        }
        if low(Aspect::Visuals) {
            suggestions.push("Try more specific search queries for stock footage".to_string());
        }
        if low(Aspect::Pacing) {
            suggestions.push("Experiment with different transition durations".to_string());
        }
    }
    if suggestions.is_empty() {
        suggestions
            .push("No specific improvements identified based on current ratings".to_string());
    }
    suggestions
}

/// Persistence the learning loop needs. Upserts are keyed by (type, key).
pub trait LearningStore {
    type Error;

    fn category_averages(&self) -> Result<CategoryAverages, Self::Error>;
    fn upsert_preference(&self, preference: &Preference) -> Result<(), Self::Error>;
    fn preferences(&self) -> Result<Vec<Preference>, Self::Error>;
}

pub struct LearningEngine<'a, S: LearningStore> {
    store: &'a S,
}

impl<'a, S: LearningStore> LearningEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        LearningEngine { store }
    }

    /// Recompute insights from the rating history and upsert derived preferences.
    pub fn analyze(&self) -> Result<Insights, S::Error> {
        let averages = self.store.category_averages()?;
        let analysis = analyze(&averages);
        for preference in &analysis.preferences {
            debug!(
                "Upserting preference {}/{} = {} (confidence {:.2})",
                preference.preference_type,
                preference.preference_key,
                preference.preference_value,
                preference.confidence
            );
            self.store.upsert_preference(preference)?;
        }
        info!(
            "Analyzed {} rating(s): {} recommendation(s)",
            analysis.insights.total_ratings,
            analysis.insights.recommendations.len()
        );
        Ok(analysis.insights)
    }

    pub fn enhance_prompt(&self, base_prompt: &str, prompt_type: PromptType) -> Result<String, S::Error> {
        let preferences = self.store.preferences()?;
        Ok(enhance_prompt(base_prompt, prompt_type, &preferences))
    }

    /// Read-only; never upserts.
    pub fn learning_summary(&self) -> Result<LearningSummary, S::Error> {
        let averages = self.store.category_averages()?;
        let preferences = self.store.preferences()?;
        Ok(summarize(&averages, &preferences))
    }

    pub fn improvement_suggestions(&self) -> Result<Vec<String>, S::Error> {
        Ok(improvement_suggestions(&self.store.category_averages()?))
    }

    /// Surfaced preferences of one aspect, highest confidence first.
    pub fn surfaced(&self, aspect: Aspect) -> Result<Vec<Preference>, S::Error> {
        let mut preferences: Vec<Preference> = self
            .store
            .preferences()?
            .into_iter()
            .filter(|p| p.preference_type == aspect && p.is_surfaced())
            .collect();
        preferences.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(preferences)
    }
}
