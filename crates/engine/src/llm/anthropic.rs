use serde::{Deserialize, Serialize};

use super::{LlmError, TextRequest};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Send a messages request to an Anthropic-compatible API.
pub async fn send_messages(
    http: &reqwest::Client,
    api_key: &str,
    req: &TextRequest<'_>,
) -> Result<String, LlmError> {
    let start = std::time::Instant::now();

    let request = AnthropicRequest {
        model: req.model,
        max_tokens: req.max_tokens,
        system: req.system,
        messages: vec![AnthropicMessage {
            role: "user",
            content: req.user,
        }],
        temperature: req.temperature,
    };

    let response = http
        .post(ANTHROPIC_MESSAGES_URL)
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&request)
        .send()
        .await
        .map_err(|e| LlmError::Http(e.to_string()))?;

    let status = response.status();
    let latency = start.elapsed().as_secs_f64();
    metrics::histogram!("llm.api.latency", "provider" => "anthropic", "model" => req.model.to_string())
        .record(latency);

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Auth(format!("{}: {}", status, body)));
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return Err(LlmError::RateLimited { retry_after });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let msg = match serde_json::from_str::<AnthropicError>(&body) {
            Ok(e) => e.error.message,
            Err(_) => body,
        };
        return Err(LlmError::Api(format!("{}: {}", status, msg)));
    }

    let body: AnthropicResponse = response
        .json()
        .await
        .map_err(|e| LlmError::Parse(format!("Failed to parse Anthropic response: {}", e)))?;

    if let Some(usage) = &body.usage {
        metrics::counter!("llm.api.input_tokens", "provider" => "anthropic")
            .increment(usage.input_tokens);
        metrics::counter!("llm.api.output_tokens", "provider" => "anthropic")
            .increment(usage.output_tokens);
    }

    let text: String = body
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text),
            AnthropicContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        return Err(LlmError::Api("Empty completion from Anthropic".into()));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_response() {
        let json = r#"{
            "content": [{"type": "text", "text": "Hello"}],
            "usage": {"input_tokens": 12, "output_tokens": 3}
        }"#;

        let resp: AnthropicResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.content.len(), 1);
        match &resp.content[0] {
            AnthropicContentBlock::Text { text } => assert_eq!(text, "Hello"),
            AnthropicContentBlock::Other => panic!("Expected text block"),
        }
    }

    #[test]
    fn test_unknown_blocks_tolerated() {
        let json = r#"{
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Answer"}
            ]
        }"#;

        let resp: AnthropicResponse = serde_json::from_str(json).unwrap();
        let texts: Vec<_> = resp
            .content
            .into_iter()
            .filter_map(|b| match b {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect();
        assert_eq!(texts, vec!["Answer"]);
    }

    #[test]
    fn test_request_shape() {
        let request = AnthropicRequest {
            model: "claude-sonnet-4-20250514",
            max_tokens: 512,
            system: "Be terse.",
            messages: vec![AnthropicMessage {
                role: "user",
                content: "Hi",
            }],
            temperature: 0.3,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["system"], "Be terse.");
        assert_eq!(value["messages"][0]["role"], "user");
    }
}
