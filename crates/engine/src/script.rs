//! `[Visual: …]` / `[Narration: …]` scripts.
//!
//! A script is a sequence of optional section labels (`HOOK (0-3 seconds):`),
//! visual cues and narration fragments. Each visual cue opens a segment; the
//! narration that follows belongs to it. Tags may span several lines.

use serde::{Deserialize, Serialize};

const VISUAL_TAG: &str = "visual";
const NARRATION_TAG: &str = "narration";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSegment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub visual: String,
    pub narration: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub segments: Vec<ScriptSegment>,
}

impl Script {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// All narration fragments joined with single spaces, in order.
    pub fn narration_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.narration.trim())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn visual_cues(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .map(|s| s.visual.as_str())
            .filter(|v| !v.is_empty())
    }
}

/// True if `text` already looks like a script rather than a bare topic.
pub fn has_markers(text: &str) -> bool {
    text.to_ascii_lowercase().contains("[visual:")
}

enum Token<'a> {
    Text(&'a str),
    Tag { name: String, body: &'a str },
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let tag = after
            .find(':')
            .filter(|colon| !after[..*colon].contains(&['[', ']', '\n'][..]))
            .and_then(|colon| {
                after[colon + 1..]
                    .find(']')
                    .map(|close| (colon, colon + 1 + close))
            });

        match tag {
            Some((colon, close)) => {
                if open > 0 {
                    tokens.push(Token::Text(&rest[..open]));
                }
                tokens.push(Token::Tag {
                    name: after[..colon].trim().to_ascii_lowercase(),
                    body: after[colon + 1..close].trim(),
                });
                rest = &after[close + 1..];
            }
            None => {
                tokens.push(Token::Text(&rest[..open + 1]));
                rest = after;
            }
        }
    }
    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }
    tokens
}

/// `HOOK (0-3 seconds):` → `HOOK`. Lines without a trailing colon are prose.
fn section_label(line: &str) -> Option<String> {
    let line = line.trim().trim_matches(|c| c == '*' || c == '#').trim();
    let head = line.strip_suffix(':')?;
    let head = match head.find('(') {
        Some(paren) => &head[..paren],
        None => head,
    };
    let head = head.trim();
    (!head.is_empty()).then(|| head.to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn parse_script(text: &str) -> Script {
    let mut segments: Vec<ScriptSegment> = Vec::new();
    let mut pending_label: Option<String> = None;

    for token in tokenize(text) {
        match token {
            Token::Text(chunk) => {
                if let Some(label) = chunk.lines().filter_map(section_label).last() {
                    pending_label = Some(label);
                }
            }
            Token::Tag { name, body } if name == VISUAL_TAG => {
                segments.push(ScriptSegment {
                    label: pending_label.take(),
                    visual: collapse_whitespace(body),
                    narration: String::new(),
                });
            }
            Token::Tag { name, body } if name == NARRATION_TAG => {
                let body = collapse_whitespace(body);
                match segments.last_mut() {
                    Some(segment) if pending_label.is_none() => {
                        if !segment.narration.is_empty() {
                            segment.narration.push(' ');
                        }
                        segment.narration.push_str(&body);
                    }
                    _ => segments.push(ScriptSegment {
                        label: pending_label.take(),
                        visual: String::new(),
                        narration: body,
                    }),
                }
            }
            Token::Tag { .. } => {}
        }
    }

    Script { segments }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
HOOK (0-3 seconds):
[Visual: aerial city view at night]
[Narration: Ever wondered how cities never sleep?]

SEGMENT 1 (3-15 seconds):
[Visual: person typing on laptop]
[Narration: Behind every light is someone
  still working.]

OUTRO (last 5 seconds):
[Visual: sunrise over skyline]
[Narration: Follow for more.]
";

    #[test]
    fn extracts_segments_in_order() {
        let script = parse_script(SAMPLE);
        assert_eq!(script.segments.len(), 3);
        assert_eq!(script.segments[0].label.as_deref(), Some("HOOK"));
        assert_eq!(script.segments[0].visual, "aerial city view at night");
        assert_eq!(script.segments[1].label.as_deref(), Some("SEGMENT 1"));
        assert_eq!(
            script.segments[1].narration,
            "Behind every light is someone still working."
        );
        assert_eq!(script.segments[2].label.as_deref(), Some("OUTRO"));
        assert_eq!(
            script.visual_cues().collect::<Vec<_>>(),
            vec!["aerial city view at night", "person typing on laptop", "sunrise over skyline"]
        );
    }

    #[test]
    fn narration_text_concatenates() {
        let script = parse_script(SAMPLE);
        assert_eq!(
            script.narration_text(),
            "Ever wondered how cities never sleep? Behind every light is someone still working. Follow for more."
        );
    }

    #[test]
    fn tags_are_case_insensitive_and_unknown_tags_ignored() {
        let script = parse_script("[VISUAL: ocean waves] [Music: calm] [narration: Breathe.]");
        assert_eq!(script.segments.len(), 1);
        assert_eq!(script.segments[0].visual, "ocean waves");
        assert_eq!(script.segments[0].narration, "Breathe.");
    }

    #[test]
    fn narration_without_visual_still_counts() {
        let script = parse_script("[Narration: Just talk.]");
        assert_eq!(script.segments.len(), 1);
        assert!(script.segments[0].visual.is_empty());
        assert_eq!(script.visual_cues().count(), 0);
        assert_eq!(script.narration_text(), "Just talk.");
    }

    #[test]
    fn detects_markers() {
        assert!(has_markers(SAMPLE));
        assert!(!has_markers("The history of coffee"));
        assert!(parse_script("The history of coffee").is_empty());
    }

    #[test]
    fn stray_brackets_are_text() {
        let script = parse_script("[note] [Visual: forest]");
        assert_eq!(script.segments.len(), 1);
        assert_eq!(script.segments[0].visual, "forest");
    }
}
