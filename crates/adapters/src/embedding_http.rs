//! Embedding provider adapter (OpenAI-compatible `/v1/embeddings` shape).

use codesync_config::EmbeddingConfig;
use codesync_ports::{BoxFuture, EmbeddingPort, EmbeddingProviderInfo};
use codesync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HEALTH_PROBE_TEXT: &str = "health probe";

/// HTTP embedding adapter for OpenAI-compatible providers.
pub struct HttpEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    endpoint: Box<str>,
    model: Box<str>,
    dimensions: u32,
}

impl HttpEmbedding {
    /// Build an embedding adapter from configuration.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "embedding timeout must be greater than zero",
            ));
        }
        if config.dimensions == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "embedding dimensions must be greater than zero",
            ));
        }

        let mut headers = HeaderMap::new();
        if let Some(api_key) = config.api_key.as_deref() {
            let mut value =
                HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                    ErrorEnvelope::expected(
                        ErrorCode::invalid_input(),
                        "embedding api key contains invalid header characters",
                    )
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("provider", "client_init_failed"),
                    format!("failed to build embedding client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;

        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            provider: EmbeddingProviderInfo {
                id: "http".into(),
                name: "HTTP embeddings".into(),
            },
            client,
            endpoint: format!("{base}/v1/embeddings").into_boxed_str(),
            model: config.model.clone().into_boxed_str(),
            dimensions: config.dimensions,
        })
    }

    async fn request_embeddings(
        &self,
        ctx: &RequestContext,
        texts: Vec<String>,
        operation: &'static str,
    ) -> Result<Vec<Vec<f32>>> {
        ctx.ensure_not_cancelled(operation)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();

        let request = EmbeddingsRequest {
            model: self.model.clone(),
            input: texts,
        };
        let response = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled(operation)),
            result = self.client.post(self.endpoint.as_ref()).json(&request).send() => {
                result.map_err(map_reqwest_error)?
            }
        };

        let status = response.status();
        let payload = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled(operation)),
            result = response.bytes() => result.map_err(map_reqwest_error)?,
        };
        if !status.is_success() {
            return Err(map_http_error(status, &payload));
        }

        let decoded: EmbeddingsResponse = serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("provider", "invalid_response"),
                format!("failed to decode embeddings response: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;

        let mut data = decoded.data;
        data.sort_by_key(|entry| entry.index);
        if data.len() != expected {
            return Err(ErrorEnvelope::unexpected(
                ErrorCode::new("provider", "count_mismatch"),
                format!("expected {expected} embeddings, got {}", data.len()),
                ErrorClass::NonRetriable,
            ));
        }
        Ok(data.into_iter().map(|entry| entry.embedding).collect())
    }
}

fn cancelled(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
}

fn map_reqwest_error(error: reqwest::Error) -> ErrorEnvelope {
    let class = if error.is_timeout() || error.is_connect() {
        ErrorClass::Retriable
    } else {
        ErrorClass::NonRetriable
    };
    ErrorEnvelope::unexpected(
        ErrorCode::new("provider", "request_failed"),
        format!("embedding request failed: {error}"),
        class,
    )
}

fn map_http_error(status: StatusCode, payload: &[u8]) -> ErrorEnvelope {
    let body = String::from_utf8_lossy(payload);
    let snippet: String = body.chars().take(200).collect();
    let class = if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ErrorClass::Retriable
    } else {
        ErrorClass::NonRetriable
    };
    ErrorEnvelope::unexpected(
        ErrorCode::new("provider", "http_error"),
        format!("embedding provider returned {status}: {snippet}"),
        class,
    )
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: Box<str>,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingEntry {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingPort for HttpEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn dimensions(&self) -> u32 {
        self.dimensions
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        texts: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.request_embeddings(&ctx, texts, "embedding.embed_batch")
                .await
        })
    }

    fn health_check(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let vectors = self
                .request_embeddings(
                    &ctx,
                    vec![HEALTH_PROBE_TEXT.to_string()],
                    "embedding.health_check",
                )
                .await?;
            if vectors.first().is_none_or(Vec::is_empty) {
                return Err(ErrorEnvelope::unexpected(
                    ErrorCode::new("provider", "empty_embedding"),
                    "health probe returned an empty embedding",
                    ErrorClass::Retriable,
                ));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig {
            base_url: server.uri(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
            dimensions: 3,
            timeout_ms: 5_000,
        }
    }

    #[tokio::test]
    async fn embeds_a_batch_in_input_order() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_partial_json(json!({"model": "nomic-embed-text"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "index": 1, "embedding": [0.4, 0.5, 0.6] },
                    { "index": 0, "embedding": [0.1, 0.2, 0.3] }
                ]
            })))
            .mount(&server)
            .await;

        let provider = HttpEmbedding::new(&config(&server))?;
        let ctx = RequestContext::new_operation();
        let vectors = provider
            .embed_batch(&ctx, vec!["fn a()".to_string(), "fn b()".to_string()])
            .await?;

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.1, 0.2, 0.3]);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
        assert_eq!(provider.dimensions(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn count_mismatch_is_rejected() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [ { "index": 0, "embedding": [0.1, 0.2, 0.3] } ]
            })))
            .mount(&server)
            .await;

        let provider = HttpEmbedding::new(&config(&server))?;
        let ctx = RequestContext::new_operation();
        let result = provider
            .embed_batch(&ctx, vec!["a".to_string(), "b".to_string()])
            .await;
        assert!(matches!(result, Err(ref e) if e.code.is("provider", "count_mismatch")));
        Ok(())
    }

    #[tokio::test]
    async fn server_errors_are_retriable() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = HttpEmbedding::new(&config(&server))?;
        let ctx = RequestContext::new_operation();
        let result = provider.embed_batch(&ctx, vec!["a".to_string()]).await;
        match result {
            Err(error) => assert!(error.class.is_retriable()),
            Ok(_) => {
                return Err(ErrorEnvelope::invariant(
                    ErrorCode::internal(),
                    "expected http error",
                ));
            },
        }
        Ok(())
    }

    #[tokio::test]
    async fn health_check_probes_the_endpoint() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [ { "index": 0, "embedding": [0.1, 0.2, 0.3] } ]
            })))
            .mount(&server)
            .await;

        let provider = HttpEmbedding::new(&config(&server))?;
        let ctx = RequestContext::new_operation();
        provider.health_check(&ctx).await
    }
}
