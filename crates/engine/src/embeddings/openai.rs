use serde::{Deserialize, Serialize};

use super::EmbeddingError;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: u32,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

/// Call the OpenAI /v1/embeddings endpoint.
pub async fn call_openai_embeddings(
    http: &reqwest::Client,
    api_key: &str,
    model: &str,
    dimensions: u32,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let start = std::time::Instant::now();

    let request = EmbeddingRequest {
        model,
        input: texts,
        dimensions,
    };

    let response = http
        .post(OPENAI_EMBEDDINGS_URL)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| EmbeddingError::Http(e.to_string()))?;

    let status = response.status();
    let latency = start.elapsed().as_secs_f64();
    metrics::histogram!("embedding.api.latency").record(latency);

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingError::Auth(format!("{}: {}", status, body)));
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return Err(EmbeddingError::RateLimited { retry_after });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let msg = match serde_json::from_str::<OpenAiError>(&body) {
            Ok(e) => e.error.message,
            Err(_) => body,
        };
        return Err(EmbeddingError::Api(format!("{}: {}", status, msg)));
    }

    let body: EmbeddingResponse = response
        .json()
        .await
        .map_err(|e| EmbeddingError::Api(format!("Failed to parse embedding response: {}", e)))?;

    // The API may reorder entries; restore input order by index.
    let mut data = body.data;
    data.sort_by_key(|d| d.index);

    for entry in &data {
        if entry.embedding.len() != dimensions as usize {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimensions,
                got: entry.embedding.len(),
            });
        }
    }

    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_reorder_response() {
        let json = r#"{
            "data": [
                {"embedding": [0.3, 0.4], "index": 1},
                {"embedding": [0.1, 0.2], "index": 0}
            ]
        }"#;

        let resp: EmbeddingResponse = serde_json::from_str(json).unwrap();
        let mut data = resp.data;
        data.sort_by_key(|d| d.index);
        assert_eq!(data[0].embedding, vec![0.1, 0.2]);
        assert_eq!(data[1].embedding, vec![0.3, 0.4]);
    }

    #[test]
    fn test_request_shape() {
        let input = vec!["a".to_string(), "b".to_string()];
        let request = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &input,
            dimensions: 1536,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "text-embedding-3-small");
        assert_eq!(value["input"].as_array().unwrap().len(), 2);
        assert_eq!(value["dimensions"], 1536);
    }
}
