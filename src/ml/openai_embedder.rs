use crate::{
    config::Config,
    error::{ApiError, Result},
    ml::embedder::Embedder,
};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_CONNECTION_TIMEOUT_SECONDS: u64 = 15;
const MAX_TEXT_PREVIEW_LENGTH: usize = 100;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for the OpenAI `/embeddings` endpoint.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    api_key: Option<String>,
    embeddings_url: String,
    retry_attempts: u32,
    retry_delay_ms: u64,
}

impl OpenAiEmbedder {
    /// The API key is only checked when an embedding actually has to be computed,
    /// so a fully cached dataset can be served without one.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECONDS))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()
            .map_err(|e| ApiError::InternalError(format!("Failed to create HTTP client: {}", e)))?;

        let embeddings_url = format!("{}/embeddings", config.openai_base_url.trim_end_matches('/'));
        info!("Embeddings endpoint: {}", embeddings_url);

        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            embeddings_url,
            retry_attempts: config.retry_attempts.max(1),
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    async fn request_embedding(&self, api_key: &str, input: &str, engine: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            input: vec![input],
            model: engine,
        };

        let response = self
            .client
            .post(&self.embeddings_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ApiError::ExternalServiceError(format!(
                    "Failed to send request to embeddings API: {}",
                    e
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ApiError::ExternalServiceError(format!("Failed to read embeddings response: {}", e))
        })?;

        if !status.is_success() {
            return Err(status_error(status, &body, engine));
        }

        parse_embedding_response(&body)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str, engine: &str) -> Result<Vec<f32>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ApiError::ConfigError(
                "Missing OpenAI API key; set APP_OPENAI_API_KEY or OPENAI_API_KEY".to_string(),
            )
        })?;

        // The endpoint recommends replacing newlines, which can hurt quality
        let input = text.replace('\n', " ");

        debug!(
            "Requesting embedding with {} (length: {}): {}{}",
            engine,
            input.len(),
            input.chars().take(MAX_TEXT_PREVIEW_LENGTH).collect::<String>(),
            if input.chars().count() > MAX_TEXT_PREVIEW_LENGTH {
                "..."
            } else {
                ""
            }
        );

        let mut attempt = 1;
        loop {
            match self.request_embedding(api_key, &input, engine).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) if attempt < self.retry_attempts && is_retryable(&e) => {
                    let delay = backoff_delay(self.retry_delay_ms, attempt);
                    warn!(
                        "Embedding request failed (attempt {}/{}): {}. Retrying in {}ms",
                        attempt, self.retry_attempts, e, delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// Doubles per attempt, saturating instead of overflowing.
fn backoff_delay(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn is_retryable(error: &ApiError) -> bool {
    matches!(error, ApiError::ExternalServiceError(_))
}

fn status_error(status: StatusCode, body: &str, engine: &str) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::EmbeddingError(
            "Authentication failed. Please check your OpenAI API key.".to_string(),
        ),
        StatusCode::NOT_FOUND => ApiError::EmbeddingError(format!(
            "Engine not found: {}. Please check the embedding engine in your configuration.",
            engine
        )),
        StatusCode::TOO_MANY_REQUESTS => ApiError::ExternalServiceError(
            "Rate limit exceeded for the embeddings API".to_string(),
        ),
        status if status.is_server_error() => ApiError::ExternalServiceError(format!(
            "Embeddings API returned {} - {}",
            status, body
        )),
        status => ApiError::EmbeddingError(format!(
            "Embeddings API returned non-success status: {} - {}",
            status, body
        )),
    }
}

fn parse_embedding_response(body: &str) -> Result<Vec<f32>> {
    let parsed: EmbeddingResponse = serde_json::from_str(body).map_err(|e| {
        ApiError::SerializationError(format!("Failed to parse embeddings response: {}", e))
    })?;

    let embedding = parsed
        .data
        .into_iter()
        .next()
        .map(|data| data.embedding)
        .unwrap_or_default();

    if embedding.is_empty() {
        return Err(ApiError::EmbeddingError(
            "Embeddings API returned no embedding".to_string(),
        ));
    }

    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{dev::ServerHandle, web, App, HttpRequest, HttpResponse, HttpServer};
    use serde_json::{json, Value};
    use std::{net::TcpListener, sync::Mutex};

    const ENGINE: &str = "text-similarity-babbage-001";

    // (authorization header, request body) of every call
    type Seen = Mutex<Vec<(Option<String>, Value)>>;

    async fn fake_embeddings(
        req: HttpRequest,
        body: web::Json<Value>,
        seen: web::Data<Seen>,
    ) -> HttpResponse {
        let auth = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let input = body["input"][0].as_str().unwrap_or_default().to_string();

        let mut seen = seen.lock().unwrap();
        seen.push((auth, body.into_inner()));
        let attempts = seen
            .iter()
            .filter(|(_, b)| b["input"][0] == input.as_str())
            .count();

        match input.as_str() {
            "revoked" => HttpResponse::Unauthorized().finish(),
            "busy" => HttpResponse::TooManyRequests().finish(),
            _ if attempts < 3 => HttpResponse::ServiceUnavailable().body("overloaded"),
            _ => HttpResponse::Ok().json(json!({"data": [{"embedding": [0.5, -0.5]}]})),
        }
    }

    fn fake_openai(seen: web::Data<Seen>) -> (String, ServerHandle) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(seen.clone())
                .route("/v1/embeddings", web::post().to(fake_embeddings))
        })
        .workers(1)
        .listen(listener)
        .unwrap()
        .run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (format!("http://127.0.0.1:{}/v1", port), handle)
    }

    fn embedder_for(base_url: &str) -> OpenAiEmbedder {
        let mut config = Config::for_tests(&std::env::temp_dir());
        config.openai_base_url = base_url.to_string();
        config.openai_api_key = Some("sk-test".to_string());
        config.retry_attempts = 3;
        config.retry_delay_ms = 1;
        OpenAiEmbedder::new(&config).unwrap()
    }

    #[actix_web::test]
    async fn test_embed_retries_server_errors() {
        let seen = web::Data::new(Seen::default());
        let (base_url, server) = fake_openai(seen.clone());

        let embedding = embedder_for(&base_url)
            .embed("smoky\nvanilla", ENGINE)
            .await
            .unwrap();
        assert_eq!(embedding, vec![0.5, -0.5]);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        for (auth, body) in seen {
            assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
            assert_eq!(body, json!({"input": ["smoky vanilla"], "model": ENGINE}));
        }
        server.stop(true).await;
    }

    #[actix_web::test]
    async fn test_embed_does_not_retry_auth_failures() {
        let seen = web::Data::new(Seen::default());
        let (base_url, server) = fake_openai(seen.clone());

        let result = embedder_for(&base_url).embed("revoked", ENGINE).await;
        assert!(matches!(result, Err(ApiError::EmbeddingError(_))));
        assert_eq!(seen.lock().unwrap().len(), 1);
        server.stop(true).await;
    }

    #[actix_web::test]
    async fn test_embed_gives_up_after_rate_limits() {
        let seen = web::Data::new(Seen::default());
        let (base_url, server) = fake_openai(seen.clone());

        let result = embedder_for(&base_url).embed("busy", ENGINE).await;
        assert!(matches!(result, Err(ApiError::ExternalServiceError(_))));
        assert_eq!(seen.lock().unwrap().len(), 3);
        server.stop(true).await;
    }

    #[test]
    fn test_backoff_delay_saturates() {
        assert_eq!(backoff_delay(500, 1), 500);
        assert_eq!(backoff_delay(500, 3), 2000);
        assert_eq!(backoff_delay(500, 80), u64::MAX);
    }

    #[test]
    fn test_parse_embedding_response() {
        let body = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.25,-0.5,1.0]}],"model":"text-similarity-babbage-001"}"#;
        assert_eq!(parse_embedding_response(body).unwrap(), vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn test_parse_embedding_response_empty() {
        assert!(matches!(
            parse_embedding_response(r#"{"data":[]}"#),
            Err(ApiError::EmbeddingError(_))
        ));
        assert!(matches!(
            parse_embedding_response("not json"),
            Err(ApiError::SerializationError(_))
        ));
    }

    #[test]
    fn test_status_errors_are_classified() {
        assert!(!is_retryable(&status_error(
            StatusCode::UNAUTHORIZED,
            "",
            "engine"
        )));
        assert!(is_retryable(&status_error(
            StatusCode::TOO_MANY_REQUESTS,
            "",
            "engine"
        )));
        assert!(is_retryable(&status_error(
            StatusCode::BAD_GATEWAY,
            "",
            "engine"
        )));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let config = Config::for_tests(&std::env::temp_dir());
        let embedder = OpenAiEmbedder::new(&config).unwrap();
        let result = embedder.embed("citrus", "engine").await;
        assert!(matches!(result, Err(ApiError::ConfigError(_))));
    }
}
