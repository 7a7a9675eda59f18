//! Prompt assembly for summary and question generation.
//!
//! Prompts have three layers. The system layer and the format template are
//! owned by the pipeline and cannot be overridden; publisher-supplied
//! instructions sit in between and only control style, audience, and tone.

use serde_json::Value;

use super::LlmError;

/// Characters of article text included in a generation prompt.
const MAX_ARTICLE_CHARS: usize = 24_000;

const SUMMARY_SYSTEM: &str = "You are a precise editorial assistant that summarizes blog \
     articles. Respond with valid JSON only, conforming exactly to the schema given at the end \
     of the prompt. No prose, no markdown fences, no commentary outside the JSON.";

const QUESTIONS_SYSTEM: &str = "You are an assistant that writes engaging reader questions \
     about a blog article, each with a faithful answer drawn from the article. Respond with \
     valid JSON only, conforming exactly to the schema given at the end of the prompt. No \
     prose, no markdown fences, no commentary outside the JSON.";

const DEFAULT_SUMMARY_INSTRUCTIONS: &str = "Summarize the article below for a general \
     audience. Keep the summary to a few sentences and pull out the key points a reader \
     should remember.";

const DEFAULT_QUESTION_INSTRUCTIONS: &str = "Write questions a curious reader would ask \
     about the article below, with concise answers grounded in the article text. Pick a \
     single emoji icon that fits each question.";

const SUMMARY_FORMAT: &str = r#"Output JSON schema (follow exactly):
{"title": "...", "summary": "...", "key_points": ["...", "..."]}"#;

/// Parsed summary generation output.
#[derive(Debug, Clone)]
pub struct SummaryPayload {
    pub title: Option<String>,
    pub summary: String,
    pub key_points: Vec<String>,
}

/// Parsed question generation output.
#[derive(Debug, Clone)]
pub struct GeneratedQuestion {
    pub question: String,
    pub answer: String,
    pub icon: String,
}

/// Assemble the summary prompt. Returns `(system, user)`.
pub fn summary_prompt(
    custom_instructions: Option<&str>,
    title: Option<&str>,
    article_text: &str,
) -> (String, String) {
    let instructions = custom_instructions
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_SUMMARY_INSTRUCTIONS);

    let user = format!(
        "{}\n\nArticle title: {}\n\nArticle text:\n{}\n\n{}",
        instructions,
        title.unwrap_or("(untitled)"),
        truncate_chars(article_text, MAX_ARTICLE_CHARS),
        SUMMARY_FORMAT,
    );

    (SUMMARY_SYSTEM.to_string(), user)
}

/// Assemble the question-generation prompt. Returns `(system, user)`.
pub fn questions_prompt(
    custom_instructions: Option<&str>,
    title: Option<&str>,
    article_text: &str,
    question_count: usize,
) -> (String, String) {
    let instructions = custom_instructions
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_QUESTION_INSTRUCTIONS);

    let format = format!(
        "Generate exactly {} questions.\n\nOutput JSON schema (follow exactly):\n\
         {{\"questions\": [{{\"question\": \"...\", \"answer\": \"...\", \"icon\": \"...\"}}]}}",
        question_count
    );

    let user = format!(
        "{}\n\nArticle title: {}\n\nArticle text:\n{}\n\n{}",
        instructions,
        title.unwrap_or("(untitled)"),
        truncate_chars(article_text, MAX_ARTICLE_CHARS),
        format,
    );

    (QUESTIONS_SYSTEM.to_string(), user)
}

/// Validate summary output against the fixed schema.
pub fn parse_summary(value: &Value) -> Result<SummaryPayload, LlmError> {
    let summary = value["summary"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LlmError::Parse("summary output missing \"summary\" field".into()))?
        .to_string();

    let title = value["title"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let key_points = value["key_points"]
        .as_array()
        .map(|points| {
            points
                .iter()
                .filter_map(|p| p.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Ok(SummaryPayload {
        title,
        summary,
        key_points,
    })
}

/// Validate question output against the fixed schema, clamping the returned
/// count to `max_questions`.
pub fn parse_questions(
    value: &Value,
    max_questions: usize,
) -> Result<Vec<GeneratedQuestion>, LlmError> {
    let raw = value["questions"]
        .as_array()
        .ok_or_else(|| LlmError::Parse("questions output missing \"questions\" array".into()))?;

    let questions: Vec<GeneratedQuestion> = raw
        .iter()
        .filter_map(|item| {
            let question = item["question"].as_str()?.trim();
            let answer = item["answer"].as_str()?.trim();
            if question.is_empty() || answer.is_empty() {
                return None;
            }
            let icon = item["icon"]
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("💡");
            Some(GeneratedQuestion {
                question: question.to_string(),
                answer: answer.to_string(),
                icon: icon.to_string(),
            })
        })
        .take(max_questions)
        .collect();

    if questions.is_empty() {
        return Err(LlmError::Parse(
            "questions output contained no usable question/answer pairs".into(),
        ));
    }

    Ok(questions)
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_prompt_layers() {
        let (system, user) = summary_prompt(None, Some("Title"), "Body text");
        assert!(system.contains("valid JSON only"));
        assert!(user.starts_with(DEFAULT_SUMMARY_INSTRUCTIONS));
        assert!(user.contains("Body text"));
        assert!(user.ends_with(SUMMARY_FORMAT));
    }

    #[test]
    fn test_custom_instructions_cannot_drop_format() {
        let (_, user) = summary_prompt(Some("Write in pirate speak."), None, "Body");
        assert!(user.starts_with("Write in pirate speak."));
        // The format template is appended after publisher instructions,
        // whatever they say.
        assert!(user.contains("Output JSON schema"));
    }

    #[test]
    fn test_blank_custom_instructions_fall_back() {
        let (_, user) = questions_prompt(Some("   "), None, "Body", 5);
        assert!(user.starts_with(DEFAULT_QUESTION_INSTRUCTIONS));
    }

    #[test]
    fn test_questions_prompt_contains_count() {
        let (_, user) = questions_prompt(None, None, "Body", 7);
        assert!(user.contains("exactly 7 questions"));
        assert!(user.contains(r#"{"questions""#));
    }

    #[test]
    fn test_parse_summary() {
        let value = json!({
            "title": "T",
            "summary": "S",
            "key_points": ["a", "b", ""]
        });
        let payload = parse_summary(&value).unwrap();
        assert_eq!(payload.title.as_deref(), Some("T"));
        assert_eq!(payload.summary, "S");
        assert_eq!(payload.key_points, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_summary_requires_summary() {
        assert!(parse_summary(&json!({"title": "T"})).is_err());
        assert!(parse_summary(&json!({"summary": "  "})).is_err());
    }

    #[test]
    fn test_parse_questions_clamps_count() {
        let value = json!({
            "questions": (0..10).map(|i| json!({
                "question": format!("q{}", i),
                "answer": format!("a{}", i),
                "icon": "🔍"
            })).collect::<Vec<_>>()
        });
        let questions = parse_questions(&value, 5).unwrap();
        assert_eq!(questions.len(), 5);
        assert_eq!(questions[0].question, "q0");
    }

    #[test]
    fn test_parse_questions_defaults_icon() {
        let value = json!({
            "questions": [{"question": "q", "answer": "a"}]
        });
        let questions = parse_questions(&value, 5).unwrap();
        assert_eq!(questions[0].icon, "💡");
    }

    #[test]
    fn test_parse_questions_rejects_empty() {
        assert!(parse_questions(&json!({"questions": []}), 5).is_err());
        assert!(parse_questions(&json!({}), 5).is_err());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
