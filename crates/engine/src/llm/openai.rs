use serde::{Deserialize, Serialize};

use super::{LlmError, TextRequest};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Send a chat completion request to an OpenAI-compatible API.
pub async fn send_chat_completion(
    http: &reqwest::Client,
    api_key: &str,
    req: &TextRequest<'_>,
) -> Result<String, LlmError> {
    let start = std::time::Instant::now();

    let request = ChatRequest {
        model: req.model,
        max_tokens: req.max_tokens,
        messages: vec![
            ChatMessage {
                role: "system",
                content: req.system,
            },
            ChatMessage {
                role: "user",
                content: req.user,
            },
        ],
        temperature: req.temperature,
    };

    let response = http
        .post(OPENAI_CHAT_URL)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| LlmError::Http(e.to_string()))?;

    let status = response.status();
    let latency = start.elapsed().as_secs_f64();
    metrics::histogram!("llm.api.latency", "provider" => "openai", "model" => req.model.to_string())
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
        let msg = match serde_json::from_str::<OpenAiError>(&body) {
            Ok(e) => e.error.message,
            Err(_) => body,
        };
        return Err(LlmError::Api(format!("{}: {}", status, msg)));
    }

    let body: ChatResponse = response
        .json()
        .await
        .map_err(|e| LlmError::Parse(format!("Failed to parse OpenAI response: {}", e)))?;

    if let Some(usage) = &body.usage {
        metrics::counter!("llm.api.input_tokens", "provider" => "openai")
            .increment(usage.prompt_tokens);
        metrics::counter!("llm.api.output_tokens", "provider" => "openai")
            .increment(usage.completion_tokens);
    }

    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| LlmError::Api("Empty completion from OpenAI".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_response() {
        let json = r#"{
            "choices": [{"message": {"content": "Hello world"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }"#;

        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        let text = resp.choices.into_iter().next().unwrap().message.content;
        assert_eq!(text.as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_parse_response_without_usage() {
        let json = r#"{"choices": [{"message": {"content": "x"}}]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(resp.usage.is_none());
    }

    #[test]
    fn test_request_shape() {
        let req = TextRequest {
            model: "gpt-4o-mini",
            system: "You are helpful.",
            user: "Hello",
            max_tokens: 256,
            temperature: 0.7,
            grounding: false,
        };
        let wire = ChatRequest {
            model: req.model,
            max_tokens: req.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: req.system,
                },
                ChatMessage {
                    role: "user",
                    content: req.user,
                },
            ],
            temperature: req.temperature,
        };
        let value = serde_json::to_value(&wire).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "Hello");
        assert_eq!(value["max_tokens"], 256);
    }
}
