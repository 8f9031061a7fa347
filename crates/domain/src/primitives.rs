//! Domain primitives with validated constructors.

use codesync_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum length for repository and collection names.
const NAME_MIN_LEN: usize = 3;
/// Maximum length for repository and collection names.
const NAME_MAX_LEN: usize = 63;

/// Validation failures for domain primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// Repository name is empty after trimming.
    EmptyRepositoryName,
    /// Repository name violates the allowed pattern.
    InvalidRepositoryName {
        /// Candidate that failed validation.
        input: String,
    },
    /// Collection name is empty after trimming.
    EmptyCollectionName,
    /// Collection name violates the allowed pattern.
    InvalidCollectionName {
        /// Candidate that failed validation.
        input: String,
    },
    /// Commit SHA is not 40 hexadecimal characters.
    InvalidCommitSha {
        /// Length of the rejected input.
        input_length: usize,
    },
    /// Repository URL is not one of the two accepted forge shapes.
    InvalidRepoUrl {
        /// Rejected URL (trimmed).
        input: String,
    },
    /// Line span start/end must be >= 1.
    LineSpanNonPositive {
        /// Starting line (1-indexed).
        start_line: u32,
        /// Ending line (1-indexed).
        end_line: u32,
    },
    /// Line span start must be <= end.
    LineSpanStartAfterEnd {
        /// Starting line (1-indexed).
        start_line: u32,
        /// Ending line (1-indexed).
        end_line: u32,
    },
}

impl PrimitiveError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyRepositoryName | Self::InvalidRepositoryName { .. } => {
                ErrorCode::new("domain", "invalid_repository_name")
            },
            Self::EmptyCollectionName | Self::InvalidCollectionName { .. } => {
                ErrorCode::new("domain", "invalid_collection_name")
            },
            Self::InvalidCommitSha { .. } => ErrorCode::new("domain", "invalid_commit_sha"),
            Self::InvalidRepoUrl { .. } => ErrorCode::new("repo", "invalid_url"),
            Self::LineSpanNonPositive { .. } | Self::LineSpanStartAfterEnd { .. } => {
                ErrorCode::new("domain", "invalid_line_span")
            },
        }
    }
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRepositoryName => formatter.write_str("repository name must be non-empty"),
            Self::InvalidRepositoryName { .. } => formatter.write_str(
                "repository name must be 3-63 chars of [a-z0-9_.-], starting and ending alphanumeric",
            ),
            Self::EmptyCollectionName => formatter.write_str("collection name must be non-empty"),
            Self::InvalidCollectionName { .. } => formatter.write_str(
                "collection name must be 3-63 chars of [a-z0-9_.-], starting and ending alphanumeric",
            ),
            Self::InvalidCommitSha { .. } => {
                formatter.write_str("commit sha must be 40 hexadecimal characters")
            },
            Self::InvalidRepoUrl { .. } => formatter.write_str(
                "repository URL must look like https://<host>/<owner>/<repo>[.git] or git@<host>:<owner>/<repo>[.git]",
            ),
            Self::LineSpanNonPositive { .. } => {
                formatter.write_str("line span start/end must be >= 1")
            },
            Self::LineSpanStartAfterEnd { .. } => {
                formatter.write_str("line span start must be <= end")
            },
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let mut envelope = Self::expected(error.error_code(), error.to_string());

        match error {
            PrimitiveError::InvalidRepositoryName { input }
            | PrimitiveError::InvalidCollectionName { input }
            | PrimitiveError::InvalidRepoUrl { input } => {
                envelope = envelope.with_metadata("input", input);
            },
            PrimitiveError::InvalidCommitSha { input_length } => {
                envelope = envelope.with_metadata("input_length", input_length.to_string());
            },
            PrimitiveError::LineSpanNonPositive {
                start_line,
                end_line,
            }
            | PrimitiveError::LineSpanStartAfterEnd {
                start_line,
                end_line,
            } => {
                envelope = envelope
                    .with_metadata("start_line", start_line.to_string())
                    .with_metadata("end_line", end_line.to_string());
            },
            PrimitiveError::EmptyRepositoryName | PrimitiveError::EmptyCollectionName => {},
        }

        envelope
    }
}

fn is_valid_name(candidate: &str) -> bool {
    if candidate.len() < NAME_MIN_LEN || candidate.len() > NAME_MAX_LEN {
        return false;
    }
    let bytes = candidate.as_bytes();
    let edge_ok = |byte: u8| byte.is_ascii_lowercase() || byte.is_ascii_digit();
    let edges_ok = match (bytes.first(), bytes.last()) {
        (Some(&first), Some(&last)) => edge_ok(first) && edge_ok(last),
        _ => false,
    };
    edges_ok
        && bytes
            .iter()
            .all(|&byte| edge_ok(byte) || byte == b'_' || byte == b'.' || byte == b'-')
}

/// Sanitize arbitrary input into a valid repository/collection name.
///
/// Lowercases, replaces disallowed characters with `-`, trims
/// non-alphanumeric edges, truncates to 63 chars, and pads with `0` up to
/// the minimum length of 3. The function is idempotent: sanitizing a valid
/// name returns it unchanged.
#[must_use]
pub fn sanitize_name(input: &str) -> String {
    let lowered = input.trim().to_ascii_lowercase();
    let mut sanitized: String = lowered
        .chars()
        .map(|ch| {
            if ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | '.' | '-') {
                ch
            } else {
                '-'
            }
        })
        .collect();

    let edge = |ch: char| ch.is_ascii_lowercase() || ch.is_ascii_digit();
    sanitized = sanitized
        .trim_start_matches(|ch| !edge(ch))
        .trim_end_matches(|ch| !edge(ch))
        .to_string();

    if sanitized.len() > NAME_MAX_LEN {
        sanitized.truncate(NAME_MAX_LEN);
        sanitized = sanitized.trim_end_matches(|ch| !edge(ch)).to_string();
    }

    while sanitized.len() < NAME_MIN_LEN {
        sanitized.push('0');
    }

    sanitized
}

/// Identifier for an indexed repository, derived from its URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryName(Box<str>);

impl RepositoryName {
    /// Parse a repository name that satisfies the naming rules.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::EmptyRepositoryName);
        }
        if !is_valid_name(trimmed) {
            return Err(PrimitiveError::InvalidRepositoryName {
                input: trimmed.to_owned(),
            });
        }
        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Derive a repository name from a parsed URL by sanitizing its repo
    /// path segment.
    pub fn from_url(url: &RepoUrl) -> Result<Self, PrimitiveError> {
        Self::parse(sanitize_name(url.repo()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RepositoryName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Identifier for a vector collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionName(Box<str>);

impl CollectionName {
    /// Parse a collection name that satisfies the naming rules.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::EmptyCollectionName);
        }
        if !is_valid_name(trimmed) {
            return Err(PrimitiveError::InvalidCollectionName {
                input: trimmed.to_owned(),
            });
        }
        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&RepositoryName> for CollectionName {
    fn from(name: &RepositoryName) -> Self {
        // Repository names satisfy the same pattern as collection names.
        Self(name.as_str().to_owned().into_boxed_str())
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A full 40-character commit SHA.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitSha(Box<str>);

impl CommitSha {
    /// Parse a commit SHA (40 hex characters, normalized to lowercase).
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = input.as_ref().trim();
        if trimmed.len() != 40 || !trimmed.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(PrimitiveError::InvalidCommitSha {
                input_length: trimmed.len(),
            });
        }
        Ok(Self(trimmed.to_ascii_lowercase().into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short 7-character prefix for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl AsRef<str> for CommitSha {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A parsed forge repository URL.
///
/// Exactly two shapes are accepted:
/// `https://<host>/<owner>/<repo>[.git]` and
/// `git@<host>:<owner>/<repo>[.git]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoUrl {
    raw: Box<str>,
    host: Box<str>,
    owner: Box<str>,
    repo: Box<str>,
}

impl RepoUrl {
    /// Parse a repository URL into host, owner, and repo components.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref().trim();
        let invalid = || PrimitiveError::InvalidRepoUrl {
            input: raw.to_owned(),
        };

        if let Some(rest) = raw.strip_prefix("git@") {
            let (host, path) = rest.split_once(':').ok_or_else(invalid)?;
            let (owner, repo) = split_owner_repo(path).ok_or_else(invalid)?;
            if host.is_empty() {
                return Err(invalid());
            }
            return Ok(Self {
                raw: raw.to_owned().into_boxed_str(),
                host: host.to_owned().into_boxed_str(),
                owner,
                repo,
            });
        }

        let parsed = url::Url::parse(raw).map_err(|_| invalid())?;
        if parsed.scheme() != "https" {
            return Err(invalid());
        }
        let host = parsed.host_str().ok_or_else(invalid)?;
        let (owner, repo) = split_owner_repo(parsed.path().trim_start_matches('/'))
            .ok_or_else(invalid)?;
        Ok(Self {
            raw: raw.to_owned().into_boxed_str(),
            host: host.to_owned().into_boxed_str(),
            owner,
            repo,
        })
    }

    /// The URL exactly as given (trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Forge host (e.g. `github.com`).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Owner path segment.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository path segment with any trailing `.git` stripped.
    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }
}

impl fmt::Display for RepoUrl {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

fn split_owner_repo(path: &str) -> Option<(Box<str>, Box<str>)> {
    let path = path.trim_end_matches('/');
    let (owner, repo) = path.split_once('/')?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((
        owner.to_owned().into_boxed_str(),
        repo.to_owned().into_boxed_str(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn repository_name_rejects_invalid_patterns() {
        assert!(matches!(
            RepositoryName::parse("  ").err(),
            Some(PrimitiveError::EmptyRepositoryName)
        ));
        assert!(matches!(
            RepositoryName::parse("My Repo").err(),
            Some(PrimitiveError::InvalidRepositoryName { .. })
        ));
        assert!(matches!(
            RepositoryName::parse("-leading").err(),
            Some(PrimitiveError::InvalidRepositoryName { .. })
        ));
        assert!(matches!(
            RepositoryName::parse("ab").err(),
            Some(PrimitiveError::InvalidRepositoryName { .. })
        ));
    }

    #[test]
    fn sanitize_lowercases_and_replaces() {
        assert_eq!(sanitize_name("My Repo!"), "my-repo");
        assert_eq!(sanitize_name("Hello_World.js"), "hello_world.js");
    }

    #[test]
    fn sanitize_pads_short_names() {
        assert_eq!(sanitize_name("a"), "a00");
        assert_eq!(sanitize_name("!!"), "000");
    }

    #[test]
    fn sanitize_trims_edges_and_truncates() {
        assert_eq!(sanitize_name("--repo--"), "repo");
        let long = "a".repeat(80);
        assert_eq!(sanitize_name(&long).len(), 63);
    }

    #[test]
    fn commit_sha_requires_forty_hex_chars() -> Result<(), PrimitiveError> {
        let sha = CommitSha::parse("0123456789ABCDEF0123456789abcdef01234567")?;
        assert_eq!(sha.as_str(), "0123456789abcdef0123456789abcdef01234567");
        assert!(CommitSha::parse("abc123").is_err());
        assert!(CommitSha::parse("z".repeat(40)).is_err());

        let sha = CommitSha::parse("a".repeat(40))?;
        assert_eq!(sha.short(), "aaaaaaa");
        Ok(())
    }

    #[test]
    fn repo_url_accepts_https_form() -> Result<(), PrimitiveError> {
        let url = RepoUrl::parse("https://github.com/acme/widget-factory.git")?;
        assert_eq!(url.host(), "github.com");
        assert_eq!(url.owner(), "acme");
        assert_eq!(url.repo(), "widget-factory");
        Ok(())
    }

    #[test]
    fn repo_url_accepts_ssh_form() -> Result<(), PrimitiveError> {
        let url = RepoUrl::parse("git@github.com:acme/widget-factory")?;
        assert_eq!(url.host(), "github.com");
        assert_eq!(url.owner(), "acme");
        assert_eq!(url.repo(), "widget-factory");
        Ok(())
    }

    #[test]
    fn repo_url_rejects_other_shapes() {
        for input in [
            "http://github.com/acme/widget",
            "https://github.com/acme",
            "ftp://github.com/acme/widget",
            "git@github.com",
            "not a url",
        ] {
            assert!(
                matches!(
                    RepoUrl::parse(input).err(),
                    Some(PrimitiveError::InvalidRepoUrl { .. })
                ),
                "expected rejection for {input}"
            );
        }
    }

    #[test]
    fn derived_name_from_url_is_valid() -> Result<(), PrimitiveError> {
        let url = RepoUrl::parse("https://github.com/acme/My.Widget_Factory.git")?;
        let name = RepositoryName::from_url(&url)?;
        assert_eq!(name.as_str(), "my.widget_factory");
        Ok(())
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(input in ".{0,80}") {
            let once = sanitize_name(&input);
            let twice = sanitize_name(&once);
            prop_assert_eq!(&once, &twice);
        }

        #[test]
        fn sanitize_output_is_always_parseable(input in ".{0,80}") {
            let name = sanitize_name(&input);
            prop_assert!(RepositoryName::parse(&name).is_ok(), "invalid: {}", name);
        }
    }
}
