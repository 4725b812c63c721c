//! Remote content fetching through the GitHub contents API.

use std::{collections::HashMap, future::Future, path::PathBuf, time::Duration};

use {
    base64::Engine,
    serde::Deserialize,
    tracing::{debug, warn},
};

use crate::{
    cache,
    error::{Error, Result},
    reference::is_commit_sha,
};

/// A fetched remote file plus the blob SHA it was served at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub content: String,
    pub sha: String,
}

/// Source of remote import content.
///
/// Implemented by [`GithubFetcher`] for production and [`StaticFetcher`]
/// for tests and offline compilation.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> impl Future<Output = Result<FetchedFile>> + Send;
}

// ── GitHub API fetcher ──────────────────────────────────────────────────────

/// Fetches file content from `api.github.com` with a 30s timeout and one
/// retry on transient failure. SHA-pinned refs are served from the on-disk
/// cache without any network traffic.
pub struct GithubFetcher {
    client: reqwest::Client,
    token: Option<String>,
    cache_root: PathBuf,
    api_base: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

impl GithubFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base("https://api.github.com")
    }

    #[must_use]
    pub fn with_base(api_base: &str) -> Self {
        let token = std::env::var("GITHUB_TOKEN")
            .or_else(|_| std::env::var("GH_TOKEN"))
            .ok()
            .filter(|t| !t.is_empty());
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            token,
            cache_root: cache::cache_root(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_once(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<FetchedFile> {
        let reference = format!("{owner}/{repo}/{path}@{git_ref}");
        let url = format!(
            "{}/repos/{owner}/{repo}/contents/{path}?ref={git_ref}",
            self.api_base
        );
        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", "gh-aw")
            .header("Accept", "application/vnd.github+json");
        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(|e| Error::Fetch {
            reference: reference.clone(),
            reason: e.to_string(),
        })?;

        match response.status().as_u16() {
            200 => {},
            401 | 403 => return Err(Error::Auth { reference }),
            404 => {
                return Err(Error::NotFound {
                    reference,
                    git_ref: git_ref.to_string(),
                });
            },
            status => {
                return Err(Error::Fetch {
                    reference,
                    reason: format!("HTTP {status}"),
                });
            },
        }

        let body: ContentsResponse = response.json().await.map_err(|e| Error::Fetch {
            reference: reference.clone(),
            reason: format!("invalid contents response: {e}"),
        })?;

        // The API wraps base64 at 60 columns; strip the line breaks first.
        let packed: String = body.content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(packed)
            .map_err(|e| Error::Fetch {
                reference: reference.clone(),
                reason: format!("invalid base64 content: {e}"),
            })?;
        let content = String::from_utf8(bytes).map_err(|_| Error::Fetch {
            reference,
            reason: "imported file is not valid UTF-8".into(),
        })?;

        Ok(FetchedFile {
            content,
            sha: body.sha,
        })
    }
}

impl Default for GithubFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for GithubFetcher {
    async fn fetch(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<FetchedFile> {
        // SHA-pinned refs are immutable; serve straight from disk.
        if is_commit_sha(git_ref)
            && let Some(content) = cache::read(&self.cache_root, owner, repo, git_ref, path)
        {
            debug!(owner, repo, path, git_ref, "import cache hit");
            return Ok(FetchedFile {
                content,
                sha: git_ref.to_string(),
            });
        }

        debug!(owner, repo, path, git_ref, "fetching remote import");
        let fetched = match self.fetch_once(owner, repo, path, git_ref).await {
            Ok(f) => f,
            // One retry on transport-level or server-side failure.
            Err(Error::Fetch { reference, reason }) => {
                warn!(%reference, %reason, "retrying transient fetch failure");
                self.fetch_once(owner, repo, path, git_ref).await?
            },
            Err(other) => return Err(other),
        };

        if let Err(e) = cache::write(
            &self.cache_root,
            owner,
            repo,
            &fetched.sha,
            path,
            &fetched.content,
        ) {
            warn!(error = %e, "failed to write import cache entry");
        }

        Ok(fetched)
    }
}

// ── Static fetcher ──────────────────────────────────────────────────────────

/// In-memory fetcher keyed by `owner/repo/path@ref`. Used by tests.
#[derive(Default)]
pub struct StaticFetcher {
    files: HashMap<String, String>,
}

impl StaticFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, content: impl Into<String>) {
        self.files.insert(reference.into(), content.into());
    }
}

impl Fetcher for StaticFetcher {
    async fn fetch(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<FetchedFile> {
        let reference = format!("{owner}/{repo}/{path}@{git_ref}");
        match self.files.get(&reference) {
            Some(content) => Ok(FetchedFile {
                content: content.clone(),
                sha: format!("static-{:016x}", ghaw_common::fnv1a64(&reference)),
            }),
            None => Err(Error::NotFound {
                reference,
                git_ref: git_ref.to_string(),
            }),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_fetcher_round_trip() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert("o/r/a.md@main", "---\n---\nbody");
        let fetched = fetcher.fetch("o", "r", "a.md", "main").await.unwrap();
        assert_eq!(fetched.content, "---\n---\nbody");
    }

    #[tokio::test]
    async fn static_fetcher_missing_is_not_found() {
        let fetcher = StaticFetcher::new();
        let err = fetcher.fetch("o", "r", "a.md", "main").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
