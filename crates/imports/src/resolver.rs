//! Recursive import resolution with caching and cycle detection.
//!
//! Loading (read or fetch + parse + included-schema validation) is memoized
//! per reference identity and single-flighted, so each unique import is
//! fetched at most once per compile run no matter how many files share it.
//! Merging is a cheap pure fold and runs per occurrence.

use std::{
    collections::HashMap,
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};

use {
    ghaw_common::Diagnostic,
    ghaw_parser::{SchemaKind, split, template, validate_frontmatter},
    serde_yaml::Value,
    tokio::sync::{Mutex, OnceCell},
    tracing::debug,
};

use crate::{
    error::{Error, Result},
    fetch::Fetcher,
    merge::merge_frontmatter,
    reference::ImportRef,
};

/// A loaded (but not yet recursively expanded) import.
#[derive(Debug)]
struct LoadedFile {
    frontmatter: Value,
    body: String,
    diagnostics: Vec<Diagnostic>,
}

/// A fully expanded import: its own imports are resolved and merged in.
#[derive(Debug)]
struct ResolvedFile {
    frontmatter: Value,
    body: String,
    diagnostics: Vec<Diagnostic>,
}

/// The effective spec after import resolution.
#[derive(Debug)]
pub struct ResolvedSpec {
    /// Effective frontmatter (imports folded, importer wins).
    pub frontmatter: Value,
    /// Body with inline directives expanded and imported bodies appended.
    pub body: String,
    /// Diagnostics gathered from imported files.
    pub diagnostics: Vec<Diagnostic>,
}

/// Import resolver shared across all files of one compile run.
pub struct Resolver<F: Fetcher> {
    fetcher: F,
    loaded: Mutex<HashMap<String, Arc<OnceCell<Arc<LoadedFile>>>>>,
}

impl<F: Fetcher> Resolver<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve all imports of a spec file.
    ///
    /// `source_path` is the repo-relative path of the importing file; it
    /// seeds the cycle-detection chain and anchors relative references.
    pub async fn resolve(
        &self,
        source_path: &Path,
        frontmatter: &Value,
        body: &str,
    ) -> Result<ResolvedSpec> {
        let base_dir = source_path.parent().unwrap_or(Path::new("")).to_path_buf();
        let origin = Origin::Local { base_dir };
        let mut stack = vec![source_path.display().to_string()];

        self.expand(frontmatter, body, &origin, &mut stack).await
    }

    /// Expand one file's imports: resolve inline directives in place,
    /// resolve frontmatter imports, fold the frontmatter merge.
    async fn expand(
        &self,
        frontmatter: &Value,
        body: &str,
        origin: &Origin,
        stack: &mut Vec<String>,
    ) -> Result<ResolvedSpec> {
        let mut diagnostics = Vec::new();

        // Inline {{#import}} directives, in body order.
        let mut inline_bodies: HashMap<String, String> = HashMap::new();
        let mut imported_frontmatters: Vec<Value> = Vec::new();
        for directive in template::scan_imports(body) {
            let reference = origin.child_ref(&directive.reference)?;
            let resolved = self.resolve_ref(&reference, stack).await?;
            diagnostics.extend(resolved.diagnostics.iter().cloned());
            imported_frontmatters.push(resolved.frontmatter.clone());
            inline_bodies.insert(directive.reference.clone(), resolved.body.clone());
        }
        let mut expanded_body = template::expand_imports(body, |raw| {
            inline_bodies.get(raw).cloned().unwrap_or_default()
        });

        // Frontmatter `imports:` list, in declared order; globs expand to
        // their sorted matches.
        let mut appended_bodies: Vec<String> = Vec::new();
        for raw in import_list(frontmatter) {
            for reference in origin.expand_ref(&raw)? {
                let resolved = self.resolve_ref(&reference, stack).await?;
                diagnostics.extend(resolved.diagnostics.iter().cloned());
                imported_frontmatters.push(resolved.frontmatter.clone());
                if !resolved.body.trim().is_empty() {
                    appended_bodies.push(resolved.body.clone());
                }
            }
        }

        for imported in appended_bodies {
            if !expanded_body.ends_with('\n') && !expanded_body.is_empty() {
                expanded_body.push('\n');
            }
            expanded_body.push('\n');
            expanded_body.push_str(&imported);
        }

        // Fold: later imports outrank earlier ones, the importer outranks all.
        let mut effective = Value::Null;
        for imported in &imported_frontmatters {
            effective = merge_frontmatter(&effective, imported)?;
        }
        let mut effective = merge_frontmatter(&effective, frontmatter)?;
        strip_imports_key(&mut effective);

        Ok(ResolvedSpec {
            frontmatter: effective,
            body: expanded_body,
            diagnostics,
        })
    }

    /// Resolve a single reference to its fully expanded form.
    fn resolve_ref<'a>(
        &'a self,
        reference: &'a ImportRef,
        stack: &'a mut Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<ResolvedFile>>> + Send + 'a>>
    where
        F: 'a,
    {
        Box::pin(async move {
            let identity = reference.identity();
            if stack.contains(&identity) {
                let mut chain = stack.clone();
                chain.push(identity);
                return Err(Error::Cycle { chain });
            }

            let loaded = self.load(reference).await?;

            stack.push(identity);
            let child_origin = Origin::from_ref(reference);
            let expanded = self
                .expand(&loaded.frontmatter, &loaded.body, &child_origin, stack)
                .await;
            stack.pop();
            let expanded = expanded?;

            let mut diagnostics = loaded.diagnostics.clone();
            diagnostics.extend(expanded.diagnostics);
            Ok(Arc::new(ResolvedFile {
                frontmatter: expanded.frontmatter,
                body: expanded.body,
                diagnostics,
            }))
        })
    }

    /// Load and parse a reference, memoized and single-flighted by identity.
    async fn load(&self, reference: &ImportRef) -> Result<Arc<LoadedFile>> {
        let identity = reference.identity();
        let cell = {
            let mut loaded = self.loaded.lock().await;
            Arc::clone(loaded.entry(identity.clone()).or_default())
        };
        let file = cell
            .get_or_try_init(|| async {
                debug!(reference = %identity, "loading import");
                self.load_uncached(reference).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(file))
    }

    async fn load_uncached(&self, reference: &ImportRef) -> Result<LoadedFile> {
        let content = match reference {
            ImportRef::Local { resolved, .. } => tokio::fs::read_to_string(resolved)
                .await
                .map_err(|e| Error::Unresolved {
                    reference: reference.raw().to_string(),
                    reason: e.to_string(),
                })?,
            ImportRef::Remote {
                owner,
                repo,
                path,
                git_ref,
                ..
            } => {
                self.fetcher
                    .fetch(owner, repo, path, git_ref)
                    .await?
                    .content
            },
        };

        let identity = reference.identity();
        let split = split::split_source(&content, &identity).map_err(|e| Error::Unresolved {
            reference: reference.raw().to_string(),
            reason: e.to_string(),
        })?;
        let frontmatter = split::parse_frontmatter(&split).map_err(|e| Error::Unresolved {
            reference: reference.raw().to_string(),
            reason: e.to_string(),
        })?;

        let diagnostics = validate_frontmatter(&frontmatter, SchemaKind::Included, &split)
            .into_iter()
            .map(|d| prefix_import(d, &identity))
            .collect();

        Ok(LoadedFile {
            frontmatter,
            body: split.body,
            diagnostics,
        })
    }
}

fn prefix_import(mut diagnostic: Diagnostic, identity: &str) -> Diagnostic {
    diagnostic.message = format!("in import '{identity}': {}", diagnostic.message);
    // Source lines refer to the imported file, not the importer.
    diagnostic.line = None;
    diagnostic.column = None;
    diagnostic
}

/// Raw entries of the frontmatter `imports:` list.
fn import_list(frontmatter: &Value) -> Vec<String> {
    frontmatter
        .get("imports")
        .and_then(Value::as_sequence)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Remove `imports:` from effective frontmatter; it is consumed here and
/// must not leak into the compiled workflow.
fn strip_imports_key(frontmatter: &mut Value) {
    if let Value::Mapping(mapping) = frontmatter {
        mapping.remove("imports");
    }
}

// ── Reference context ───────────────────────────────────────────────────────

/// Where relative references inside a file resolve from.
enum Origin {
    Local { base_dir: PathBuf },
    Remote {
        owner: String,
        repo: String,
        dir: String,
        git_ref: String,
    },
}

impl Origin {
    fn from_ref(reference: &ImportRef) -> Self {
        match reference {
            ImportRef::Local { resolved, .. } => Self::Local {
                base_dir: resolved.parent().unwrap_or(Path::new("")).to_path_buf(),
            },
            ImportRef::Remote {
                owner,
                repo,
                path,
                git_ref,
                ..
            } => {
                let dir = match path.rsplit_once('/') {
                    Some((dir, _)) => dir.to_string(),
                    None => String::new(),
                };
                Self::Remote {
                    owner: owner.clone(),
                    repo: repo.clone(),
                    dir,
                    git_ref: git_ref.clone(),
                }
            },
        }
    }

    /// Parse a single (non-glob) child reference in this context. A path
    /// without `@ref` inside a remote file stays in that remote repo.
    fn child_ref(&self, raw: &str) -> Result<ImportRef> {
        match self {
            Self::Local { base_dir } => ImportRef::parse(raw, base_dir),
            Self::Remote {
                owner,
                repo,
                dir,
                git_ref,
            } => {
                if raw.contains('@') {
                    return ImportRef::parse(raw, Path::new(""));
                }
                let joined = if dir.is_empty() {
                    raw.to_string()
                } else {
                    format!("{dir}/{raw}")
                };
                Ok(ImportRef::Remote {
                    raw: raw.to_string(),
                    owner: owner.clone(),
                    repo: repo.clone(),
                    path: normalize_remote_path(&joined),
                    git_ref: git_ref.clone(),
                })
            },
        }
    }

    /// Expand a frontmatter import entry; local globs become one reference
    /// per match, sorted by path.
    fn expand_ref(&self, raw: &str) -> Result<Vec<ImportRef>> {
        let single = self.child_ref(raw)?;
        if !single.is_glob() {
            return Ok(vec![single]);
        }
        let ImportRef::Local { resolved, .. } = &single else {
            return Ok(vec![single]);
        };

        let pattern = resolved.display().to_string();
        let paths = glob::glob(&pattern).map_err(|e| Error::Unresolved {
            reference: raw.to_string(),
            reason: format!("invalid glob: {e}"),
        })?;
        let mut matches: Vec<PathBuf> = paths.filter_map(std::result::Result::ok).collect();
        matches.sort();
        if matches.is_empty() {
            return Err(Error::Unresolved {
                reference: raw.to_string(),
                reason: "glob matched no files".into(),
            });
        }
        Ok(matches
            .into_iter()
            .map(|path| ImportRef::Local {
                raw: raw.to_string(),
                resolved: path,
            })
            .collect())
    }
}

/// Collapse `..` segments in remote paths the same way local ones are
/// normalized.
fn normalize_remote_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                out.pop();
            },
            other => out.push(other),
        }
    }
    out.join("/")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::fetch::StaticFetcher};

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn no_imports_is_identity() {
        let resolver = Resolver::new(StaticFetcher::new());
        let spec = resolver
            .resolve(Path::new("wf/a.md"), &yaml("engine: copilot"), "body\n")
            .await
            .unwrap();
        assert_eq!(spec.frontmatter, yaml("engine: copilot"));
        assert_eq!(spec.body, "body\n");
    }

    #[tokio::test]
    async fn remote_frontmatter_import_merges() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert(
            "octo/shared/tools.md@main",
            "---\ntools:\n  github:\n---\nShared guidance.\n",
        );
        let resolver = Resolver::new(fetcher);
        let frontmatter = yaml("imports: [octo/shared/tools.md@main]\nengine: copilot");
        let spec = resolver
            .resolve(Path::new("wf/a.md"), &frontmatter, "Main body.\n")
            .await
            .unwrap();
        assert!(
            spec.frontmatter["tools"]
                .as_mapping()
                .unwrap()
                .contains_key("github")
        );
        // Consumed, not forwarded.
        assert!(spec.frontmatter.get("imports").is_none());
        assert!(spec.body.contains("Main body."));
        assert!(spec.body.contains("Shared guidance."));
    }

    #[tokio::test]
    async fn inline_import_expands_in_place() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert("octo/shared/steps.md@v1", "---\n---\nSTEP CONTENT\n");
        let resolver = Resolver::new(fetcher);
        let body = "before\n{{#import octo/shared/steps.md@v1}}\nafter\n";
        let spec = resolver
            .resolve(Path::new("wf/a.md"), &yaml("{}"), body)
            .await
            .unwrap();
        assert_eq!(spec.body, "before\nSTEP CONTENT\nafter\n");
    }

    #[tokio::test]
    async fn transitive_imports_resolve() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert(
            "o/r/mid.md@main",
            "---\nimports: [o/r/leaf.md@main]\ntools:\n  bash:\n---\n",
        );
        fetcher.insert("o/r/leaf.md@main", "---\ntools:\n  edit:\n---\n");
        let resolver = Resolver::new(fetcher);
        let spec = resolver
            .resolve(
                Path::new("wf/a.md"),
                &yaml("imports: [o/r/mid.md@main]"),
                "",
            )
            .await
            .unwrap();
        let tools = spec.frontmatter["tools"].as_mapping().unwrap();
        assert!(tools.contains_key("bash"));
        assert!(tools.contains_key("edit"));
    }

    #[tokio::test]
    async fn cycle_reported_with_chain() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert("o/r/a.md@main", "---\nimports: [o/r/b.md@main]\n---\n");
        fetcher.insert("o/r/b.md@main", "---\nimports: [o/r/a.md@main]\n---\n");
        let resolver = Resolver::new(fetcher);
        let err = resolver
            .resolve(Path::new("wf/root.md"), &yaml("imports: [o/r/a.md@main]"), "")
            .await
            .unwrap_err();
        match err {
            Error::Cycle { chain } => {
                assert!(chain.iter().any(|n| n.contains("a.md")));
                assert!(chain.iter().any(|n| n.contains("b.md")));
                assert_eq!(chain.first().unwrap(), "wf/root.md");
                assert_eq!(chain.last().unwrap(), "o/r/a.md@main");
            },
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn relative_ref_inside_remote_stays_remote() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert(
            "o/r/dir/mid.md@main",
            "---\nimports: [../common/leaf.md]\n---\n",
        );
        fetcher.insert("o/r/common/leaf.md@main", "---\nengine: claude\n---\n");
        let resolver = Resolver::new(fetcher);
        let spec = resolver
            .resolve(
                Path::new("wf/a.md"),
                &yaml("imports: [o/r/dir/mid.md@main]"),
                "",
            )
            .await
            .unwrap();
        assert_eq!(spec.frontmatter["engine"], yaml("claude"));
    }

    #[tokio::test]
    async fn importer_overrides_imported_engine() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert("o/r/base.md@main", "---\nengine: claude\n---\n");
        let resolver = Resolver::new(fetcher);
        let spec = resolver
            .resolve(
                Path::new("wf/a.md"),
                &yaml("imports: [o/r/base.md@main]\nengine: copilot"),
                "",
            )
            .await
            .unwrap();
        assert_eq!(spec.frontmatter["engine"], yaml("copilot"));
    }

    #[tokio::test]
    async fn local_imports_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::write(shared.join("a.md"), "---\ntools:\n  github:\n---\nA\n").unwrap();
        std::fs::write(shared.join("b.md"), "---\ntools:\n  bash:\n---\nB\n").unwrap();

        let resolver = Resolver::new(StaticFetcher::new());
        let spec = resolver
            .resolve(
                &dir.path().join("main.md"),
                &yaml("imports: [\"shared/*.md\"]"),
                "",
            )
            .await
            .unwrap();
        let tools = spec.frontmatter["tools"].as_mapping().unwrap();
        assert!(tools.contains_key("github"));
        assert!(tools.contains_key("bash"));
    }

    #[tokio::test]
    async fn imported_on_reported_as_diagnostic() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert("o/r/bad.md@main", "---\non: push\n---\n");
        let resolver = Resolver::new(fetcher);
        let spec = resolver
            .resolve(Path::new("wf/a.md"), &yaml("imports: [o/r/bad.md@main]"), "")
            .await
            .unwrap();
        assert!(
            spec.diagnostics
                .iter()
                .any(|d| d.message.contains("o/r/bad.md@main") && d.path == "on")
        );
    }
}
