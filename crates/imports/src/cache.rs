//! On-disk cache for fetched remote imports.
//!
//! Layout: `<cache-root>/imports/<owner>/<repo>/<sha>/<path>`. Content is
//! keyed by blob SHA, so entries never go stale and never need eviction.

use std::path::{Path, PathBuf};

/// Resolve the cache root: `GH_AW_CACHE_DIR` when set, otherwise the
/// platform cache directory, otherwise `.gh-aw-cache` in the working dir.
#[must_use]
pub fn cache_root() -> PathBuf {
    if let Ok(dir) = std::env::var("GH_AW_CACHE_DIR")
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs_next::cache_dir()
        .map_or_else(|| PathBuf::from(".gh-aw-cache"), |d| d.join("gh-aw"))
}

/// Cache location for one fetched file.
#[must_use]
pub fn entry_path(root: &Path, owner: &str, repo: &str, sha: &str, path: &str) -> PathBuf {
    root.join("imports").join(owner).join(repo).join(sha).join(path)
}

/// Read a cached entry if present.
#[must_use]
pub fn read(root: &Path, owner: &str, repo: &str, sha: &str, path: &str) -> Option<String> {
    std::fs::read_to_string(entry_path(root, owner, repo, sha, path)).ok()
}

/// Write an entry, creating parent directories. Failures are non-fatal for
/// compilation, so the caller decides whether to log or ignore them.
pub fn write(
    root: &Path,
    owner: &str,
    repo: &str,
    sha: &str,
    path: &str,
    content: &str,
) -> std::io::Result<()> {
    let target = entry_path(root, owner, repo, sha, path);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, content)
}
