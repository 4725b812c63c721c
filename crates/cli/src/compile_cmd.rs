//! The compile driver: discovers spec files, compiles them in parallel
//! against a shared import cache, writes lock files, and reports
//! diagnostics in stable order.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {
    ghaw_common::{Diagnostic, FileReport, Severity},
    ghaw_imports::{GithubFetcher, Resolver},
    ghaw_parser::{SchemaKind, rules, split, validate_frontmatter},
    ghaw_workflow::compile_source,
    tracing::{debug, info},
};

pub struct CompileOptions {
    pub patterns: Vec<String>,
    pub dir: PathBuf,
    pub strict: bool,
    pub no_emit: bool,
    pub json: bool,
    pub timeout_secs: Option<u64>,
}

/// Exit codes: 0 success, 1 compile/validation failure, 2 unreadable input.
const EXIT_OK: i32 = 0;
const EXIT_COMPILE_FAILED: i32 = 1;
const EXIT_UNREADABLE: i32 = 2;

struct FileOutcome {
    report: FileReport,
    unreadable: bool,
}

pub async fn run_compile(options: CompileOptions) -> anyhow::Result<i32> {
    let sources = discover(&options)?;
    if sources.is_empty() {
        eprintln!("no workflow specs found");
        return Ok(EXIT_UNREADABLE);
    }
    info!(count = sources.len(), "compiling workflow specs");

    let resolver = Arc::new(Resolver::new(GithubFetcher::new()));
    let options = Arc::new(options);

    let mut handles = Vec::new();
    for source in sources {
        let resolver = Arc::clone(&resolver);
        let options = Arc::clone(&options);
        handles.push(tokio::spawn(async move {
            let display = source.display().to_string();
            let work = compile_one(&source, &resolver, &options);
            match options.timeout_secs {
                Some(secs) => {
                    match tokio::time::timeout(Duration::from_secs(secs), work).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            let mut report = FileReport::new(&display);
                            report.push(Diagnostic::error("io", "", "canceled: deadline exceeded"));
                            FileOutcome {
                                report,
                                unreadable: false,
                            }
                        },
                    }
                },
                None => work.await,
            }
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                let mut report = FileReport::new("<internal>");
                report.push(Diagnostic::error("io", "", format!("worker panicked: {e}")));
                outcomes.push(FileOutcome {
                    report,
                    unreadable: false,
                });
            },
        }
    }

    // Stable output: group by file, sorted by name, diagnostics by line.
    outcomes.sort_by(|a, b| a.report.file.cmp(&b.report.file));

    if options.json {
        let reports: Vec<&FileReport> = outcomes.iter().map(|o| &o.report).collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_reports(&outcomes);
    }

    let unreadable = outcomes.iter().any(|o| o.unreadable);
    let failed = outcomes.iter().any(|o| o.report.has_errors());
    Ok(if unreadable {
        EXIT_UNREADABLE
    } else if failed {
        EXIT_COMPILE_FAILED
    } else {
        EXIT_OK
    })
}

fn print_reports(outcomes: &[FileOutcome]) {
    for outcome in outcomes {
        let report = &outcome.report;
        if report.diagnostics.is_empty() {
            continue;
        }
        eprintln!("{}:", report.file);
        for d in &report.diagnostics {
            let location = match (d.line, d.column) {
                (Some(line), Some(column)) => format!("{line}:{column}: "),
                (Some(line), None) => format!("{line}: "),
                _ => String::new(),
            };
            let path = if d.path.is_empty() {
                String::new()
            } else {
                format!(" [{}]", d.path)
            };
            eprintln!("  {location}{} ({}): {}{path}", d.severity, d.code, d.message);
            if let Some(ref hint) = d.hint {
                eprintln!("    hint: {hint}");
            }
        }
    }
    let errors: usize = outcomes
        .iter()
        .map(|o| o.report.count(Severity::Error))
        .sum();
    let warnings: usize = outcomes
        .iter()
        .map(|o| o.report.count(Severity::Warning))
        .sum();
    if errors > 0 || warnings > 0 {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }
}

/// Expand patterns (default `.github/workflows/*.md`) to source files.
fn discover(options: &CompileOptions) -> anyhow::Result<Vec<PathBuf>> {
    let mut patterns = options.patterns.clone();
    if patterns.is_empty() {
        patterns.push(".github/workflows/*.md".to_string());
    }

    let mut sources = Vec::new();
    for pattern in &patterns {
        let absolute = if Path::new(pattern).is_absolute() {
            pattern.clone()
        } else {
            options.dir.join(pattern).display().to_string()
        };
        if !absolute.contains(['*', '?', '[']) {
            sources.push(PathBuf::from(absolute));
            continue;
        }
        for entry in glob::glob(&absolute)? {
            match entry {
                Ok(path) if path.extension().is_some_and(|e| e == "md") => sources.push(path),
                _ => {},
            }
        }
    }
    sources.sort();
    sources.dedup();
    Ok(sources)
}

async fn compile_one(
    source: &Path,
    resolver: &Resolver<GithubFetcher>,
    options: &CompileOptions,
) -> FileOutcome {
    let display_path = source.display().to_string();
    let mut report = FileReport::new(&display_path);
    debug!(file = %display_path, "compiling");

    let content = match tokio::fs::read_to_string(source).await {
        Ok(content) => content,
        Err(e) => {
            report.push(Diagnostic::error("io", "", format!("cannot read source: {e}")));
            return FileOutcome {
                report,
                unreadable: true,
            };
        },
    };

    // Split and parse; these are the only per-file fatal failures.
    let split = match split::split_source(&content, &display_path) {
        Ok(split) => split,
        Err(e) => {
            report.push(Diagnostic::error("syntax", "", e.to_string()));
            return FileOutcome {
                report,
                unreadable: false,
            };
        },
    };
    let frontmatter = match split::parse_frontmatter(&split) {
        Ok(frontmatter) => frontmatter,
        Err(ghaw_parser::Error::Yaml {
            message,
            line,
            column,
        }) => {
            let mut d = Diagnostic::error("syntax", "", message);
            if let Some(line) = line {
                d = d.at(line, column);
            }
            report.push(d);
            return FileOutcome {
                report,
                unreadable: false,
            };
        },
        Err(e) => {
            report.push(Diagnostic::error("syntax", "", e.to_string()));
            return FileOutcome {
                report,
                unreadable: false,
            };
        },
    };

    // Source-located validation of the raw frontmatter.
    let mut located = validate_frontmatter(&frontmatter, SchemaKind::Main, &split);
    located.extend(rules::check_rules(&frontmatter, &split.body, &split));

    // Import resolution.
    let resolved = match resolver.resolve(source, &frontmatter, &split.body).await {
        Ok(resolved) => resolved,
        Err(e) => {
            report.extend(located);
            report.push(Diagnostic::error("import", "imports", e.to_string()));
            return FileOutcome {
                report,
                unreadable: false,
            };
        },
    };
    report.extend(resolved.diagnostics.clone());

    let compiled = compile_source(
        &display_path,
        &content,
        &resolved.frontmatter,
        &resolved.body,
        options.strict,
    );

    // The post-merge pass repeats raw-tree findings without locations;
    // keep the located copy and drop the duplicate.
    let mut merged = located;
    for d in compiled.report.diagnostics {
        let duplicate = merged
            .iter()
            .any(|m| m.code == d.code && m.path == d.path && m.message == d.message);
        if !duplicate {
            merged.push(d);
        }
    }
    report.extend(merged);
    report.sort_by_line();

    let mut unreadable = false;
    if let Some(lock_content) = compiled.content {
        if options.no_emit {
            debug!(file = %display_path, "validated (no emit)");
        } else if let Err(e) = tokio::fs::write(&compiled.lock_path, &lock_content).await {
            report.push(Diagnostic::error(
                "io",
                "",
                format!("cannot write {}: {e}", compiled.lock_path),
            ));
            unreadable = true;
        } else {
            info!(lock = %compiled.lock_path, "wrote lock file");
        }
    }

    FileOutcome { report, unreadable }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn options(dir: &Path) -> CompileOptions {
        CompileOptions {
            patterns: Vec::new(),
            dir: dir.to_path_buf(),
            strict: false,
            no_emit: false,
            json: false,
            timeout_secs: None,
        }
    }

    fn write_spec(dir: &Path, name: &str, content: &str) -> PathBuf {
        let workflows = dir.join(".github/workflows");
        std::fs::create_dir_all(&workflows).unwrap();
        let path = workflows.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn compiles_to_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(
            dir.path(),
            "greet.md",
            "---\non: push\nengine: copilot\n---\nSay hello.\n",
        );
        let code = run_compile(options(dir.path())).await.unwrap();
        assert_eq!(code, EXIT_OK);
        let lock = dir.path().join(".github/workflows/greet.lock.yml");
        let content = std::fs::read_to_string(lock).unwrap();
        assert!(content.starts_with("# This file was generated by gh-aw"));
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn repeat_compilation_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(
            dir.path(),
            "daily-news.md",
            "---\non: daily\nsafe-outputs:\n  create-issue:\n---\nCollect news.\n",
        );
        let lock = dir.path().join(".github/workflows/daily-news.lock.yml");
        run_compile(options(dir.path())).await.unwrap();
        let first = std::fs::read_to_string(&lock).unwrap();
        run_compile(options(dir.path())).await.unwrap();
        let second = std::fs::read_to_string(&lock).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn validation_failure_exits_one_without_output() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(dir.path(), "bad.md", "---\nengine: nonsense\n---\nbody\n");
        let code = run_compile(options(dir.path())).await.unwrap();
        assert_eq!(code, EXIT_COMPILE_FAILED);
        assert!(!dir.path().join(".github/workflows/bad.lock.yml").exists());
    }

    #[tokio::test]
    async fn missing_file_exits_two() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.patterns = vec!["does-not-exist.md".to_string()];
        let code = run_compile(opts).await.unwrap();
        assert_eq!(code, EXIT_UNREADABLE);
    }

    #[tokio::test]
    async fn no_emit_validates_only() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(dir.path(), "greet.md", "---\non: push\n---\nHello.\n");
        let mut opts = options(dir.path());
        opts.no_emit = true;
        let code = run_compile(opts).await.unwrap();
        assert_eq!(code, EXIT_OK);
        assert!(!dir.path().join(".github/workflows/greet.lock.yml").exists());
    }

    #[tokio::test]
    async fn multiple_files_compiled_in_one_run() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(dir.path(), "a.md", "---\non: push\n---\nA.\n");
        write_spec(dir.path(), "b.md", "---\non: daily\n---\nB.\n");
        let code = run_compile(options(dir.path())).await.unwrap();
        assert_eq!(code, EXIT_OK);
        assert!(dir.path().join(".github/workflows/a.lock.yml").exists());
        assert!(dir.path().join(".github/workflows/b.lock.yml").exists());
    }

    #[tokio::test]
    async fn local_import_merges_tools() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(
            dir.path(),
            "shared.md",
            "---\ntools:\n  github:\n---\nShared guidance.\n",
        );
        write_spec(
            dir.path(),
            "main.md",
            "---\non: push\nimports:\n  - shared.md\n---\nMain.\n",
        );
        let code = run_compile(options(dir.path())).await.unwrap();
        assert_eq!(code, EXIT_OK);
        let lock = std::fs::read_to_string(dir.path().join(".github/workflows/main.lock.yml"))
            .unwrap();
        assert!(lock.contains("github-mcp-server"));
        assert!(lock.contains("Shared guidance."));
    }
}
