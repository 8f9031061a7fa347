//! Forge commit API adapter (GitHub-compatible REST shape).

use chrono::{DateTime, Utc};
use codesync_config::ForgeConfig;
use codesync_domain::{CommitSha, FileChange, FileChangeKind};
use codesync_ports::{BoxFuture, CommitComparison, CommitInfo, ForgePort};
use codesync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;

const ACCEPT_JSON: &str = "application/vnd.github+json";
const AGENT: &str = concat!("codesync/", env!("CARGO_PKG_VERSION"));

/// Forge adapter speaking the GitHub commits/compare REST API.
pub struct HttpForge {
    client: reqwest::Client,
    base_url: Box<str>,
}

impl HttpForge {
    /// Build a forge adapter from configuration.
    pub fn new(config: &ForgeConfig) -> Result<Self> {
        if config.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "forge timeout must be greater than zero",
            ));
        }
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));
        if let Some(token) = config.token.as_deref() {
            let mut value =
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                    ErrorEnvelope::expected(
                        ErrorCode::invalid_input(),
                        "forge token contains invalid header characters",
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
                    ErrorCode::new("forge", "client_init_failed"),
                    format!("failed to build forge client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;

        Ok(Self {
            client,
            base_url: config
                .api_base_url
                .trim_end_matches('/')
                .to_owned()
                .into_boxed_str(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        url: String,
        operation: &'static str,
    ) -> Result<T> {
        ctx.ensure_not_cancelled(operation)?;

        let response = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled(operation)),
            result = self.client.get(&url).send() => result.map_err(map_reqwest_error)?,
        };

        let status = response.status();
        let payload = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled(operation)),
            result = response.bytes() => result.map_err(map_reqwest_error)?,
        };

        if !status.is_success() {
            return Err(map_http_error(status, &payload));
        }

        serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("forge", "invalid_response"),
                format!("failed to decode forge response: {error}"),
                ErrorClass::NonRetriable,
            )
        })
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
        ErrorCode::new("forge", "request_failed"),
        format!("forge request failed: {error}"),
        class,
    )
}

fn map_http_error(status: StatusCode, payload: &[u8]) -> ErrorEnvelope {
    let body = String::from_utf8_lossy(payload);
    let snippet: String = body.chars().take(200).collect();
    if status == StatusCode::NOT_FOUND {
        // The coordinator treats unknown base commits as force pushes.
        return ErrorEnvelope::expected(
            ErrorCode::new("forge", "not_found"),
            format!("forge returned 404: {snippet}"),
        );
    }
    let class = if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ErrorClass::Retriable
    } else {
        ErrorClass::NonRetriable
    };
    ErrorEnvelope::unexpected(
        ErrorCode::new("forge", "http_error"),
        format!("forge returned {status}: {snippet}"),
        class,
    )
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    commit: CommitDetails,
}

#[derive(Debug, Deserialize)]
struct CommitDetails {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    base_commit: CommitRef,
    total_commits: u64,
    #[serde(default)]
    files: Vec<CompareFile>,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CompareFile {
    filename: String,
    status: String,
    #[serde(default)]
    previous_filename: Option<String>,
}

fn map_file(file: CompareFile) -> Option<FileChange> {
    let kind = match file.status.as_str() {
        "added" | "copied" => FileChangeKind::Added,
        "modified" | "changed" => FileChangeKind::Modified,
        "removed" => FileChangeKind::Deleted,
        "renamed" => FileChangeKind::Renamed,
        // Unchanged entries carry no indexing work.
        _ => return None,
    };
    Some(FileChange {
        path: file.filename,
        kind,
        previous_path: file.previous_filename,
    })
}

impl ForgePort for HttpForge {
    fn head_commit(
        &self,
        ctx: &RequestContext,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> BoxFuture<'_, Result<CommitInfo>> {
        let ctx = ctx.clone();
        let url = format!("{}/repos/{owner}/{repo}/commits/{branch}", self.base_url);
        Box::pin(async move {
            let response: CommitResponse =
                self.get_json(&ctx, url, "forge.head_commit").await?;
            let sha = CommitSha::parse(&response.sha).map_err(ErrorEnvelope::from)?;
            let author = response.commit.author.unwrap_or(CommitAuthor {
                name: None,
                date: None,
            });
            Ok(CommitInfo {
                sha,
                message: response.commit.message,
                author: author.name.unwrap_or_default(),
                date: author.date.unwrap_or_else(Utc::now),
            })
        })
    }

    fn compare_commits(
        &self,
        ctx: &RequestContext,
        owner: &str,
        repo: &str,
        base: &CommitSha,
        head: &CommitSha,
    ) -> BoxFuture<'_, Result<CommitComparison>> {
        let ctx = ctx.clone();
        let url = format!(
            "{}/repos/{owner}/{repo}/compare/{base}...{head}",
            self.base_url
        );
        let head = head.clone();
        Box::pin(async move {
            let response: CompareResponse =
                self.get_json(&ctx, url, "forge.compare_commits").await?;
            let base_sha =
                CommitSha::parse(&response.base_commit.sha).map_err(ErrorEnvelope::from)?;
            Ok(CommitComparison {
                base_sha,
                head_sha: head,
                total_commits: response.total_commits,
                files: response.files.into_iter().filter_map(map_file).collect(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesync_ports::is_forge_not_found;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BASE: &str = "1111111111111111111111111111111111111111";
    const HEAD: &str = "2222222222222222222222222222222222222222";

    fn config(server: &MockServer) -> ForgeConfig {
        ForgeConfig {
            host: "github.com".to_string(),
            api_base_url: server.uri(),
            token: Some("test-token".to_string()),
            timeout_ms: 5_000,
        }
    }

    fn sha(value: &str) -> Result<CommitSha> {
        CommitSha::parse(value).map_err(ErrorEnvelope::from)
    }

    #[tokio::test]
    async fn head_commit_parses_sha_and_author() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/commits/main"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": HEAD,
                "commit": {
                    "message": "feat: add widgets",
                    "author": { "name": "Dev", "date": "2026-07-01T10:00:00Z" }
                }
            })))
            .mount(&server)
            .await;

        let forge = HttpForge::new(&config(&server))?;
        let ctx = RequestContext::new_operation();
        let info = forge.head_commit(&ctx, "acme", "widget", "main").await?;
        assert_eq!(info.sha.as_str(), HEAD);
        assert_eq!(info.message, "feat: add widgets");
        assert_eq!(info.author, "Dev");
        Ok(())
    }

    #[tokio::test]
    async fn compare_maps_statuses_and_previous_filenames() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/widget/compare/{BASE}...{HEAD}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "base_commit": { "sha": BASE },
                "total_commits": 3,
                "files": [
                    { "filename": "src/new.ts", "status": "added" },
                    { "filename": "src/app.ts", "status": "modified" },
                    { "filename": "src/old.ts", "status": "removed" },
                    { "filename": "src/b.ts", "status": "renamed", "previous_filename": "src/a.ts" },
                    { "filename": "src/same.ts", "status": "unchanged" }
                ]
            })))
            .mount(&server)
            .await;

        let forge = HttpForge::new(&config(&server))?;
        let ctx = RequestContext::new_operation();
        let comparison = forge
            .compare_commits(&ctx, "acme", "widget", &sha(BASE)?, &sha(HEAD)?)
            .await?;

        assert_eq!(comparison.total_commits, 3);
        assert_eq!(comparison.files.len(), 4, "unchanged entries are dropped");
        assert_eq!(comparison.files[0].kind, FileChangeKind::Added);
        assert_eq!(comparison.files[3].kind, FileChangeKind::Renamed);
        assert_eq!(
            comparison.files[3].previous_path.as_deref(),
            Some("src/a.ts")
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_base_commit_maps_to_forge_not_found() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})),
            )
            .mount(&server)
            .await;

        let forge = HttpForge::new(&config(&server))?;
        let ctx = RequestContext::new_operation();
        let result = forge
            .compare_commits(&ctx, "acme", "widget", &sha(BASE)?, &sha(HEAD)?)
            .await;

        match result {
            Err(error) => assert!(is_forge_not_found(&error)),
            Ok(_) => {
                return Err(ErrorEnvelope::invariant(
                    ErrorCode::internal(),
                    "expected not_found",
                ));
            },
        }
        Ok(())
    }

    #[tokio::test]
    async fn server_errors_are_retriable() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let forge = HttpForge::new(&config(&server))?;
        let ctx = RequestContext::new_operation();
        let result = forge.head_commit(&ctx, "acme", "widget", "main").await;
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
}
