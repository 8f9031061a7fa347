//! Structural graph store adapter (REST shape).

use codesync_config::GraphConfig;
use codesync_domain::RepositoryName;
use codesync_ports::{BoxFuture, GraphDeleteStats, GraphIngestStats, GraphPort};
use codesync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// REST graph store adapter.
///
/// `POST /api/v1/graph/files` ingests a file; `POST
/// /api/v1/graph/files/delete` removes a file's nodes and relationships.
pub struct RestGraphStore {
    client: reqwest::Client,
    base_url: Box<str>,
}

impl RestGraphStore {
    /// Build a graph adapter from configuration; `None` when disabled.
    pub fn from_config(config: &GraphConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let Some(base_url) = config.base_url.as_deref() else {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid"),
                "graph.baseUrl is required when graph.enabled is true",
            ));
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("graph", "client_init_failed"),
                    format!("failed to build graph client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;
        Ok(Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned().into_boxed_str(),
        }))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        url: String,
        body: serde_json::Value,
        operation: &'static str,
    ) -> Result<T> {
        ctx.ensure_not_cancelled(operation)?;
        let response = tokio::select! {
            () = ctx.cancelled() => {
                return Err(ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", operation));
            }
            result = self.client.post(&url).json(&body).send() => {
                result.map_err(|error| map_reqwest_error(&error))?
            }
        };
        let status = response.status();
        let payload = response.bytes().await.map_err(|error| map_reqwest_error(&error))?;
        if !status.is_success() {
            let snippet: String = String::from_utf8_lossy(&payload).chars().take(200).collect();
            let class = if status.is_server_error() {
                ErrorClass::Retriable
            } else {
                ErrorClass::NonRetriable
            };
            return Err(ErrorEnvelope::unexpected(
                ErrorCode::new("graph", "http_error"),
                format!("graph store returned {status}: {snippet}"),
                class,
            ));
        }
        serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("graph", "invalid_response"),
                format!("failed to decode graph response: {error}"),
                ErrorClass::NonRetriable,
            )
        })
    }
}

fn map_reqwest_error(error: &reqwest::Error) -> ErrorEnvelope {
    let class = if error.is_timeout() || error.is_connect() {
        ErrorClass::Retriable
    } else {
        ErrorClass::NonRetriable
    };
    ErrorEnvelope::unexpected(
        ErrorCode::new("graph", "request_failed"),
        format!("graph request failed: {error}"),
        class,
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    #[serde(default)]
    nodes_created: u64,
    #[serde(default)]
    relationships_created: u64,
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    #[serde(default)]
    nodes_deleted: u64,
    #[serde(default)]
    relationships_deleted: u64,
    #[serde(default)]
    success: bool,
}

impl GraphPort for RestGraphStore {
    fn ingest_file(
        &self,
        ctx: &RequestContext,
        repository: &RepositoryName,
        path: &str,
        content: &str,
    ) -> BoxFuture<'_, Result<GraphIngestStats>> {
        let ctx = ctx.clone();
        let url = format!("{}/api/v1/graph/files", self.base_url);
        let body = serde_json::json!({
            "repository": repository.as_str(),
            "path": path,
            "content": content,
        });
        Box::pin(async move {
            let response: IngestResponse =
                self.post_json(&ctx, url, body, "graph.ingest_file").await?;
            Ok(GraphIngestStats {
                nodes_created: response.nodes_created,
                relationships_created: response.relationships_created,
                success: response.success,
            })
        })
    }

    fn delete_file_data(
        &self,
        ctx: &RequestContext,
        repository: &RepositoryName,
        path: &str,
    ) -> BoxFuture<'_, Result<GraphDeleteStats>> {
        let ctx = ctx.clone();
        let url = format!("{}/api/v1/graph/files/delete", self.base_url);
        let body = serde_json::json!({
            "repository": repository.as_str(),
            "path": path,
        });
        Box::pin(async move {
            let response: DeleteResponse = self
                .post_json(&ctx, url, body, "graph.delete_file_data")
                .await?;
            Ok(GraphDeleteStats {
                nodes_deleted: response.nodes_deleted,
                relationships_deleted: response.relationships_deleted,
                success: response.success,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> GraphConfig {
        GraphConfig {
            enabled: true,
            base_url: Some(server.uri()),
        }
    }

    fn repo() -> Result<RepositoryName> {
        RepositoryName::parse("widget").map_err(ErrorEnvelope::from)
    }

    #[tokio::test]
    async fn disabled_config_builds_nothing() -> Result<()> {
        let adapter = RestGraphStore::from_config(&GraphConfig::default())?;
        assert!(adapter.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn enabled_without_url_is_a_config_error() {
        let result = RestGraphStore::from_config(&GraphConfig {
            enabled: true,
            base_url: None,
        });
        assert!(matches!(result, Err(ref e) if e.code.is("config", "invalid")));
    }

    #[tokio::test]
    async fn ingest_round_trips_counters() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/graph/files"))
            .and(body_partial_json(json!({
                "repository": "widget",
                "path": "src/app.ts"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nodesCreated": 4,
                "relationshipsCreated": 2,
                "success": true
            })))
            .mount(&server)
            .await;

        let adapter = RestGraphStore::from_config(&config(&server))?.ok_or_else(|| {
            ErrorEnvelope::invariant(ErrorCode::internal(), "adapter should be enabled")
        })?;
        let ctx = RequestContext::new_operation();
        let stats = adapter
            .ingest_file(&ctx, &repo()?, "src/app.ts", "export const a = 1;")
            .await?;
        assert_eq!(stats.nodes_created, 4);
        assert_eq!(stats.relationships_created, 2);
        assert!(stats.success);
        Ok(())
    }

    #[tokio::test]
    async fn delete_round_trips_counters() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/graph/files/delete"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nodesDeleted": 3,
                "relationshipsDeleted": 1,
                "success": true
            })))
            .mount(&server)
            .await;

        let adapter = RestGraphStore::from_config(&config(&server))?.ok_or_else(|| {
            ErrorEnvelope::invariant(ErrorCode::internal(), "adapter should be enabled")
        })?;
        let ctx = RequestContext::new_operation();
        let stats = adapter.delete_file_data(&ctx, &repo()?, "src/app.ts").await?;
        assert_eq!(stats.nodes_deleted, 3);
        assert_eq!(stats.relationships_deleted, 1);
        Ok(())
    }
}
