use serde_json::{json, Value};

use super::{LlmError, TextRequest};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Build the request body for the Gemini generateContent API. Gemini takes
/// the system prompt as a separate `system_instruction` field; grounding is
/// requested via the Google Search tool.
fn build_request_body(req: &TextRequest<'_>, grounding: bool) -> Value {
    let mut body = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": req.user }],
        }],
        "system_instruction": {
            "parts": [{ "text": req.system }],
        },
        "generationConfig": {
            "temperature": req.temperature,
            "maxOutputTokens": req.max_tokens,
        },
    });

    if grounding {
        body["tools"] = json!([{ "google_search": {} }]);
    }

    body
}

/// Send a generateContent request to a Gemini-compatible API.
pub async fn send_generate_content(
    http: &reqwest::Client,
    api_key: &str,
    req: &TextRequest<'_>,
    grounding: bool,
) -> Result<String, LlmError> {
    let start = std::time::Instant::now();
    let url = format!("{}/{}:generateContent", GEMINI_BASE_URL, req.model);

    let body = build_request_body(req, grounding);

    let response = http
        .post(&url)
        .header("x-goog-api-key", api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| LlmError::Http(e.to_string()))?;

    let status = response.status();
    let latency = start.elapsed().as_secs_f64();
    metrics::histogram!("llm.api.latency", "provider" => "gemini", "model" => req.model.to_string())
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
        return Err(LlmError::Api(format!("{}: {}", status, body)));
    }

    let resp: Value = response
        .json()
        .await
        .map_err(|e| LlmError::Parse(format!("Failed to parse Gemini response: {}", e)))?;

    let text = resp["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| {
            LlmError::Parse("missing candidates[0].content.parts[0].text".into())
        })?
        .to_string();

    if text.is_empty() {
        return Err(LlmError::Api("Empty completion from Gemini".into()));
    }

    if let Some(usage) = resp.get("usageMetadata") {
        if let Some(n) = usage["promptTokenCount"].as_u64() {
            metrics::counter!("llm.api.input_tokens", "provider" => "gemini").increment(n);
        }
        if let Some(n) = usage["candidatesTokenCount"].as_u64() {
            metrics::counter!("llm.api.output_tokens", "provider" => "gemini").increment(n);
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TextRequest<'static> {
        TextRequest {
            model: "gemini-2.0-flash",
            system: "You are helpful.",
            user: "Hello",
            max_tokens: 4096,
            temperature: 0.1,
            grounding: false,
        }
    }

    #[test]
    fn test_request_body_structure() {
        let body = build_request_body(&request(), false);

        // System instruction is separate from contents.
        assert_eq!(
            body["system_instruction"]["parts"][0]["text"]
                .as_str()
                .unwrap(),
            "You are helpful."
        );

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Hello");

        let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.1).abs() < 1e-6);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);

        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_grounding_adds_search_tool() {
        let body = build_request_body(&request(), true);
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert!(tools[0].get("google_search").is_some());
    }

    #[test]
    fn test_candidate_text_path() {
        let resp = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Answer"}]}
            }]
        });
        assert_eq!(
            resp["candidates"][0]["content"]["parts"][0]["text"]
                .as_str()
                .unwrap(),
            "Answer"
        );
    }
}
