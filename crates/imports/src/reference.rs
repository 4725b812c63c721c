//! Import reference grammar.
//!
//! Two forms:
//! - `path/to/file.md` — local, resolved relative to the importing file.
//!   May contain glob metacharacters in frontmatter `imports:` lists.
//! - `owner/repo/path@ref` — remote; `ref` is a branch, tag, or 40-hex
//!   commit SHA. The `@ref` suffix is what distinguishes a remote reference
//!   from a local path with the same slash count.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// A parsed import reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportRef {
    Local {
        raw: String,
        /// Absolute (or workspace-rooted) resolved path.
        resolved: PathBuf,
    },
    Remote {
        raw: String,
        owner: String,
        repo: String,
        path: String,
        git_ref: String,
    },
}

impl ImportRef {
    /// Parse a reference string, resolving local paths against `base_dir`
    /// (the directory of the importing file).
    pub fn parse(raw: &str, base_dir: &Path) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::Unresolved {
                reference: raw.to_string(),
                reason: "empty reference".into(),
            });
        }

        if let Some((location, git_ref)) = trimmed.rsplit_once('@') {
            let segments: Vec<&str> = location.splitn(3, '/').collect();
            if let [owner, repo, path] = segments.as_slice()
                && !owner.is_empty()
                && !repo.is_empty()
                && !path.is_empty()
            {
                if git_ref.is_empty() {
                    return Err(Error::Unresolved {
                        reference: raw.to_string(),
                        reason: "empty ref after '@'".into(),
                    });
                }
                return Ok(Self::Remote {
                    raw: trimmed.to_string(),
                    owner: (*owner).to_string(),
                    repo: (*repo).to_string(),
                    path: (*path).to_string(),
                    git_ref: git_ref.to_string(),
                });
            }
            return Err(Error::Unresolved {
                reference: raw.to_string(),
                reason: "remote references take the form owner/repo/path@ref".into(),
            });
        }

        if trimmed.starts_with('/') {
            return Err(Error::Unresolved {
                reference: raw.to_string(),
                reason: "local imports must be relative to the importing file".into(),
            });
        }

        Ok(Self::Local {
            raw: trimmed.to_string(),
            resolved: normalize(&base_dir.join(trimmed)),
        })
    }

    /// Canonical identity used for caching and cycle detection.
    #[must_use]
    pub fn identity(&self) -> String {
        match self {
            Self::Local { resolved, .. } => resolved.display().to_string(),
            Self::Remote {
                owner,
                repo,
                path,
                git_ref,
                ..
            } => format!("{owner}/{repo}/{path}@{git_ref}"),
        }
    }

    /// The reference exactly as written.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Local { raw, .. } | Self::Remote { raw, .. } => raw,
        }
    }

    /// Whether the raw local reference contains glob metacharacters.
    #[must_use]
    pub fn is_glob(&self) -> bool {
        matches!(self, Self::Local { raw, .. } if raw.contains(['*', '?', '[']))
    }
}

/// Is `git_ref` a full 40-character commit SHA (immutable, disk-cacheable)?
#[must_use]
pub fn is_commit_sha(git_ref: &str) -> bool {
    git_ref.len() == 40 && git_ref.chars().all(|c| c.is_ascii_hexdigit())
}

/// Lexically normalize `.` and `..` segments without touching the
/// filesystem, so identities stay stable for not-yet-fetched paths.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {},
            std::path::Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            },
            other => out.push(other),
        }
    }
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_relative() {
        let r = ImportRef::parse("shared/tools.md", Path::new("/w/.github/workflows")).unwrap();
        match &r {
            ImportRef::Local { resolved, .. } => {
                assert_eq!(resolved, Path::new("/w/.github/workflows/shared/tools.md"));
            },
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!r.is_glob());
    }

    #[test]
    fn local_parent_normalized() {
        let r = ImportRef::parse("../common/base.md", Path::new("/w/.github/workflows")).unwrap();
        assert_eq!(r.identity(), "/w/.github/common/base.md");
    }

    #[test]
    fn remote_with_branch() {
        let r = ImportRef::parse(
            "githubnext/agentics/workflows/shared.md@main",
            Path::new("/w"),
        )
        .unwrap();
        match r {
            ImportRef::Remote {
                owner,
                repo,
                path,
                git_ref,
                ..
            } => {
                assert_eq!(owner, "githubnext");
                assert_eq!(repo, "agentics");
                assert_eq!(path, "workflows/shared.md");
                assert_eq!(git_ref, "main");
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn remote_requires_three_segments() {
        assert!(ImportRef::parse("repo/file.md@main", Path::new("/w")).is_err());
    }

    #[test]
    fn empty_ref_rejected() {
        assert!(ImportRef::parse("o/r/p.md@", Path::new("/w")).is_err());
        assert!(ImportRef::parse("  ", Path::new("/w")).is_err());
    }

    #[test]
    fn absolute_local_rejected() {
        assert!(ImportRef::parse("/etc/passwd", Path::new("/w")).is_err());
    }

    #[test]
    fn glob_detected() {
        let r = ImportRef::parse("shared/*.md", Path::new("/w")).unwrap();
        assert!(r.is_glob());
    }

    #[test]
    fn sha_detection() {
        assert!(is_commit_sha("0123456789abcdef0123456789abcdef01234567"));
        assert!(!is_commit_sha("main"));
        assert!(!is_commit_sha("0123456789abcdef"));
    }
}
