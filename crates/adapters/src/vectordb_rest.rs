//! Vector store adapter (name-addressed REST shape).

use codesync_config::VectorStoreConfig;
use codesync_domain::{CollectionName, RepositoryName};
use codesync_ports::{BoxFuture, VectorDocument, VectorStorePort};
use codesync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// REST vector store adapter.
///
/// Talks to a Chroma-style HTTP API addressed by collection name:
/// `POST /api/v1/collections`, `POST /api/v1/collections/{name}/{add|upsert|delete}`,
/// `GET /api/v1/collections/{name}/count`.
pub struct RestVectorStore {
    client: reqwest::Client,
    base_url: Box<str>,
}

impl RestVectorStore {
    /// Build a vector store adapter from configuration.
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        if config.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "vector store timeout must be greater than zero",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("store", "client_init_failed"),
                    format!("failed to build vector store client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .trim_end_matches('/')
                .to_owned()
                .into_boxed_str(),
        })
    }

    fn collection_url(&self, collection: &CollectionName, suffix: &str) -> String {
        format!("{}/api/v1/collections/{collection}{suffix}", self.base_url)
    }

    async fn send(
        &self,
        ctx: &RequestContext,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<(StatusCode, Vec<u8>)> {
        ctx.ensure_not_cancelled(operation)?;
        let response = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled(operation)),
            result = request.send() => result.map_err(map_reqwest_error)?,
        };
        let status = response.status();
        let payload = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled(operation)),
            result = response.bytes() => result.map_err(map_reqwest_error)?,
        };
        Ok((status, payload.to_vec()))
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
        ErrorCode::new("store", "request_failed"),
        format!("vector store request failed: {error}"),
        class,
    )
}

fn http_error(status: StatusCode, payload: &[u8]) -> ErrorEnvelope {
    let body = String::from_utf8_lossy(payload);
    let snippet: String = body.chars().take(200).collect();
    let class = if status.is_server_error() {
        ErrorClass::Retriable
    } else {
        ErrorClass::NonRetriable
    };
    ErrorEnvelope::unexpected(
        ErrorCode::new("store", "http_error"),
        format!("vector store returned {status}: {snippet}"),
        class,
    )
}

#[derive(Debug, Serialize)]
struct WriteDocumentsRequest {
    ids: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    documents: Vec<String>,
    metadatas: Vec<Value>,
}

impl WriteDocumentsRequest {
    fn from_documents(documents: Vec<VectorDocument>) -> Result<Self> {
        let mut ids = Vec::with_capacity(documents.len());
        let mut embeddings = Vec::with_capacity(documents.len());
        let mut contents = Vec::with_capacity(documents.len());
        let mut metadatas = Vec::with_capacity(documents.len());
        for document in documents {
            ids.push(document.id);
            embeddings.push(document.embedding);
            contents.push(document.content);
            metadatas.push(serde_json::to_value(&document.metadata).map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("store", "encode_failed"),
                    format!("failed to encode document metadata: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?);
        }
        Ok(Self {
            ids,
            embeddings,
            documents: contents,
            metadatas,
        })
    }
}

#[derive(Debug, Serialize)]
struct DeleteByPathRequest {
    #[serde(rename = "where")]
    filter: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeleteResponse {
    Ids(Vec<String>),
    Count { deleted: u64 },
}

impl VectorStorePort for RestVectorStore {
    fn get_or_create_collection(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let url = format!("{}/api/v1/collections", self.base_url);
        let body = serde_json::json!({
            "name": collection.as_str(),
            "get_or_create": true,
        });
        Box::pin(async move {
            let request = self.client.post(&url).json(&body);
            let (status, payload) = self.send(&ctx, request, "store.create_collection").await?;
            if status.is_success() {
                Ok(())
            } else {
                Err(http_error(status, &payload))
            }
        })
    }

    fn delete_collection(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let url = format!("{}/api/v1/collections/{collection}", self.base_url);
        Box::pin(async move {
            let request = self.client.delete(&url);
            let (status, payload) = self.send(&ctx, request, "store.delete_collection").await?;
            // Deleting an absent collection is a no-op.
            if status.is_success() || status == StatusCode::NOT_FOUND {
                Ok(())
            } else {
                Err(http_error(status, &payload))
            }
        })
    }

    fn add_documents(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
        documents: Vec<VectorDocument>,
    ) -> BoxFuture<'_, Result<()>> {
        self.write_documents(ctx, collection, documents, "/add", "store.add_documents")
    }

    fn upsert_documents(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
        documents: Vec<VectorDocument>,
    ) -> BoxFuture<'_, Result<()>> {
        self.write_documents(
            ctx,
            collection,
            documents,
            "/upsert",
            "store.upsert_documents",
        )
    }

    fn delete_documents_by_file_path(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
        repository: &RepositoryName,
        file_path: &str,
    ) -> BoxFuture<'_, Result<u64>> {
        let ctx = ctx.clone();
        let url = self.collection_url(collection, "/delete");
        let body = DeleteByPathRequest {
            filter: serde_json::json!({
                "$and": [
                    { "repository": repository.as_str() },
                    { "file_path": file_path }
                ]
            }),
        };
        Box::pin(async move {
            let request = self.client.post(&url).json(&body);
            let (status, payload) = self.send(&ctx, request, "store.delete_by_path").await?;
            if !status.is_success() {
                return Err(http_error(status, &payload));
            }
            let decoded: DeleteResponse =
                serde_json::from_slice(&payload).map_err(|error| {
                    ErrorEnvelope::unexpected(
                        ErrorCode::new("store", "invalid_response"),
                        format!("failed to decode delete response: {error}"),
                        ErrorClass::NonRetriable,
                    )
                })?;
            Ok(match decoded {
                DeleteResponse::Ids(ids) => ids.len() as u64,
                DeleteResponse::Count { deleted } => deleted,
            })
        })
    }

    fn count_documents(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
    ) -> BoxFuture<'_, Result<u64>> {
        let ctx = ctx.clone();
        let url = self.collection_url(collection, "/count");
        Box::pin(async move {
            let request = self.client.get(&url);
            let (status, payload) = self.send(&ctx, request, "store.count").await?;
            if !status.is_success() {
                return Err(http_error(status, &payload));
            }
            serde_json::from_slice(&payload).map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("store", "invalid_response"),
                    format!("failed to decode count response: {error}"),
                    ErrorClass::NonRetriable,
                )
            })
        })
    }
}

impl RestVectorStore {
    fn write_documents(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
        documents: Vec<VectorDocument>,
        suffix: &str,
        operation: &'static str,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let url = self.collection_url(collection, suffix);
        Box::pin(async move {
            if documents.is_empty() {
                return Ok(());
            }
            let body = WriteDocumentsRequest::from_documents(documents)?;
            let request = self.client.post(&url).json(&body);
            let (status, payload) = self.send(&ctx, request, operation).await?;
            if status.is_success() {
                Ok(())
            } else {
                Err(http_error(status, &payload))
            }
        })
    }
}
