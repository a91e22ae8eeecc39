use async_trait::async_trait;
use tracing::debug;

use crate::error::LlmError;
use crate::gemini::GeminiClient;

pub const SCRIPT_WRITER_INSTRUCTION: &str = r#"You are a professional video script writer specializing in short-form content (YouTube Shorts, Reels, TikTok).

Your task is to create engaging video scripts that:
1. Hook viewers in the first 3 seconds
2. Deliver value through the main content
3. End with a clear call-to-action

FORMAT YOUR OUTPUT AS A STRUCTURED SCRIPT:

HOOK (0-3 seconds):
[Visual: description of what should appear on screen]
[Narration: what the voiceover says]

SEGMENT 1 (3-15 seconds):
[Visual: description]
[Narration: text]

SEGMENT 2 (15-30 seconds):
[Visual: description]
[Narration: text]

... continue for all segments ...

OUTRO (last 5 seconds):
[Visual: description]
[Narration: call to action]

IMPORTANT GUIDELINES:
- Each [Visual] tag should describe searchable stock footage (e.g., "aerial city view", "person typing on laptop")
- Keep narration natural and conversational
- Total script should be 30-60 seconds when spoken
- Include 4-8 segments for variety

When given a topic, create a complete script following this format."#;

const QUERY_INSTRUCTION: &str = "You turn a video shot description into a stock footage search query. \
Reply with 2 to 4 simple descriptive keywords and nothing else. \
For abstract concepts use a concrete visual metaphor.";

const MAX_QUERY_WORDS: usize = 6;

/// Language model used for drafting scripts and search queries.
#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn draft_script(&self, prompt: &str) -> Result<String, LlmError>;

    /// Shorten a visual cue into a search query. `hints` are learned visual preferences.
    async fn refine_query(&self, visual_cue: &str, hints: &[String]) -> Result<String, LlmError>;
}

pub struct GeminiWriter {
    client: GeminiClient,
    model: String,
}

impl GeminiWriter {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        GeminiWriter {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ScriptWriter for GeminiWriter {
    async fn draft_script(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self
            .client
            .generate(&self.model, Some(SCRIPT_WRITER_INSTRUCTION), prompt, None)
            .await?;
        let script = response.text().ok_or(LlmError::Empty)?;
        debug!("Drafted script of {} chars with {}", script.len(), self.model);
        Ok(script)
    }

    async fn refine_query(&self, visual_cue: &str, hints: &[String]) -> Result<String, LlmError> {
        let response = self
            .client
            .generate(&self.model, Some(QUERY_INSTRUCTION), &query_prompt(visual_cue, hints), None)
            .await?;
        let text = response.text().ok_or(LlmError::Empty)?;
        clean_query(&text).ok_or(LlmError::Empty)
    }
}

/// User prompt for drafting a script about `topic`.
pub fn script_prompt(topic: &str) -> String {
    format!("Create a short-form video script about: {}", topic.trim())
}

fn query_prompt(visual_cue: &str, hints: &[String]) -> String {
    let mut prompt = format!("Shot description: {}", visual_cue.trim());
    if !hints.is_empty() {
        prompt.push_str("\nPreferences:");
        for hint in hints {
            prompt.push_str("\n- ");
            prompt.push_str(hint);
        }
    }
    prompt
}

/// First line of a model reply, stripped of quotes and punctuation, capped in length.
pub fn clean_query(reply: &str) -> Option<String> {
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;
    let words: Vec<&str> = line
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-'))
        .filter(|w| !w.is_empty())
        .take(MAX_QUERY_WORDS)
        .collect();
    (!words.is_empty()).then(|| words.join(" ").to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_model_replies() {
        assert_eq!(clean_query("\"coffee pour, slow motion.\"\n").as_deref(), Some("coffee pour slow motion"));
        assert_eq!(
            clean_query("\n  Aerial city skyline at night with lights everywhere").as_deref(),
            Some("aerial city skyline at night with")
        );
        assert_eq!(clean_query(" \n ** \n"), None);
    }

    #[test]
    fn query_prompt_lists_hints() {
        let prompt = query_prompt("a barista pouring latte art", &["Prioritize high-quality footage".to_string()]);
        assert!(prompt.starts_with("Shot description: a barista pouring latte art"));
        assert!(prompt.ends_with("- Prioritize high-quality footage"));
        assert!(!query_prompt("x", &[]).contains("Preferences"));
    }

    #[tokio::test]
    async fn drafting_without_key_fails_fast() {
        let writer = GeminiWriter::new(GeminiClient::new(None, reqwest::Client::new()), "gemini-2.0-flash");
        let err = writer.draft_script(&script_prompt("coffee")).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingKey));
    }
}
