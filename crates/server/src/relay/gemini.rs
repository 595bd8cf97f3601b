//! # Gemini テキスト生成クライアント
//!
//! Google Generative Language API の `generateContent` を呼び出す
//! `TextGenerator` 実装。

use serde::Deserialize;

use super::{GenerationError, TextGenerator};

/// デフォルトのAPIベースURL。
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// デフォルトのモデルID。
pub const DEFAULT_MODEL: &str = "gemini-pro";

/// Gemini REST APIによるテキスト生成。
pub struct GeminiGenerator {
    http_client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(
        http_client: reqwest::Client,
        api_base: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            api_base: api_base.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// 先頭候補のテキストパートを連結する。
fn extract_text(response: GenerateContentResponse) -> Result<String, GenerationError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(text)
}

#[async_trait::async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(format!("レスポンス読み取り失敗: {e}")))?;

        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: response_body,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&response_body)
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        extract_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::Json;

    /// モック生成APIを起動し、ベースURLを返す。
    async fn start_mock_api(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        format!("http://127.0.0.1:{port}")
    }

    const PATH: &str = "/v1beta/models/gemini-pro:generateContent";

    /// リクエスト形式とAPIキーヘッダーを検証し、テキストを取り出せること
    #[tokio::test]
    async fn test_generate_success() {
        let app = axum::Router::new().route(
            PATH,
            axum::routing::post(
                |headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(headers.get("x-goog-api-key").unwrap(), "test-key");
                    assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
                    Json(serde_json::json!({
                        "candidates": [{
                            "content": { "parts": [{ "text": "Namaste, " }, { "text": "counsel." }] }
                        }]
                    }))
                },
            ),
        );
        let base = start_mock_api(app).await;

        let generator = GeminiGenerator::new(reqwest::Client::new(), base, DEFAULT_MODEL, "test-key");
        let text = generator.generate("hello").await.unwrap();
        assert_eq!(text, "Namaste, counsel.");
    }

    #[tokio::test]
    async fn test_generate_non_success_status() {
        let app = axum::Router::new().route(
            PATH,
            axum::routing::post(|| async {
                (StatusCode::FORBIDDEN, "API key not valid")
            }),
        );
        let base = start_mock_api(app).await;

        let generator = GeminiGenerator::new(reqwest::Client::new(), base, DEFAULT_MODEL, "bad");
        let err = generator.generate("hello").await.unwrap_err();
        assert!(matches!(err, GenerationError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_generate_malformed_and_blocked() {
        let app = axum::Router::new()
            .route(PATH, axum::routing::post(|| async { "not json" }))
            .route(
                "/v1beta/models/blocked:generateContent",
                axum::routing::post(|| async {
                    Json(serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } }))
                }),
            );
        let base = start_mock_api(app).await;

        let generator =
            GeminiGenerator::new(reqwest::Client::new(), base.clone(), DEFAULT_MODEL, "k");
        assert!(matches!(
            generator.generate("x").await,
            Err(GenerationError::Malformed(_))
        ));

        let generator = GeminiGenerator::new(reqwest::Client::new(), base, "blocked", "k");
        assert!(matches!(
            generator.generate("x").await,
            Err(GenerationError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_generate_transport_error() {
        let generator = GeminiGenerator::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1",
            DEFAULT_MODEL,
            "k",
        );
        assert!(matches!(
            generator.generate("x").await,
            Err(GenerationError::Transport(_))
        ));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let generator = GeminiGenerator::new(
            reqwest::Client::new(),
            "https://example.test/",
            "gemini-1.5-flash",
            "k",
        );
        assert_eq!(
            generator.endpoint(),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
