//! The require-graph inliner.

use std::{
    collections::{HashMap, HashSet},
    sync::LazyLock,
};

use regex::Regex;

use crate::error::{Error, Result};

/// Hard cap on emitted line length. GitHub Actions rejects workflow files
/// with longer lines, so the bundler fails early and points at the source.
pub const MAX_LINE_LENGTH: usize = 21_000;

static RELATIVE_REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#"require\(\s*["'](\.\.?/[^"']+)["']\s*\)"#).expect("relative require regex")
});

static STD_REQUIRE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#"^\s*(?:const|let|var)\s+.+=\s*require\(\s*["'][A-Za-z][^"']*["']\s*\)\s*;?\s*$"#)
        .expect("std require regex")
});

static EXPORTS_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^(module\.exports\s*=|exports\.[A-Za-z_$][\w$]*\s*=)").expect("exports regex")
});

/// In-memory module sources keyed by normalized path ("dir/file.cjs").
#[derive(Debug, Default, Clone)]
pub struct SourceMap {
    files: HashMap<String, String>,
}

impl SourceMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.files.insert(path.into(), source.into());
    }

    fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Resolve a relative require against the requiring file's directory,
    /// trying the path verbatim and with `.cjs` / `.js` appended.
    fn resolve(&self, from: &str, required: &str) -> Option<String> {
        let dir = match from.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        };
        let joined = normalize(&if dir.is_empty() {
            required.to_string()
        } else {
            format!("{dir}/{required}")
        });
        for candidate in [
            joined.clone(),
            format!("{joined}.cjs"),
            format!("{joined}.js"),
        ] {
            if self.files.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

fn normalize(path: &str) -> String {
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

/// Bundle `entry` with all of its relative requires inlined.
///
/// Guarantees on success: no relative `require()` remains, every module is
/// inlined at most once, duplicate std-module requires are dropped, exports
/// statements of inlined modules are stripped, and no line exceeds
/// [`MAX_LINE_LENGTH`].
pub fn bundle(entry: &str, sources: &SourceMap) -> Result<String> {
    let entry_source = sources
        .get(entry)
        .ok_or_else(|| Error::MissingSource { path: entry.to_string() })?;

    let mut inlined: HashSet<String> = HashSet::new();
    inlined.insert(entry.to_string());
    let mut output = inline_requires(entry, entry_source, sources, &mut inlined, false)?;

    output = dedup_std_requires(&output);
    check_no_relative_requires(&output)?;
    check_runtime_mixing(entry_source, &output)?;
    check_line_lengths(&output)?;
    Ok(output)
}

/// Recursively replace relative-require statements with module bodies.
fn inline_requires(
    path: &str,
    source: &str,
    sources: &SourceMap,
    inlined: &mut HashSet<String>,
    strip_exports: bool,
) -> Result<String> {
    let body = if strip_exports {
        strip_module_exports(source)
    } else {
        source.to_string()
    };

    let mut out = String::with_capacity(body.len());
    for line in body.lines() {
        let Some(captures) = RELATIVE_REQUIRE_RE.captures(line) else {
            out.push_str(line);
            out.push('\n');
            continue;
        };
        let required = &captures[1];
        let Some(resolved) = sources.resolve(path, required) else {
            return Err(Error::UnresolvedRequire {
                required: required.to_string(),
                from: path.to_string(),
            });
        };

        if inlined.contains(&resolved) {
            out.push_str(&format!("// bundled: {resolved}\n"));
            continue;
        }
        inlined.insert(resolved.clone());

        let module_source = sources
            .get(&resolved)
            .ok_or_else(|| Error::MissingSource { path: resolved.clone() })?;
        let module_body = inline_requires(&resolved, module_source, sources, inlined, true)?;
        out.push_str(&format!("// --- begin {resolved} ---\n"));
        out.push_str(&module_body);
        if !module_body.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("// --- end {resolved} ---\n"));
    }
    Ok(out)
}

/// Remove top-level `module.exports = …` / `exports.x = …` statements.
///
/// Assignments guarded by `if (typeof module !== "undefined" …)` blocks are
/// preserved: test builds rely on them and they are inert in the runner.
fn strip_module_exports(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut skip_depth: Option<i64> = None;
    let mut guard_depth: i64 = 0;
    let mut depth: i64 = 0;

    for line in source.lines() {
        let trimmed = line.trim_start();
        let opens = line.matches('{').count() as i64;
        let closes = line.matches('}').count() as i64;

        if trimmed.contains("typeof module") && trimmed.starts_with("if") {
            guard_depth = depth + 1;
        }

        if let Some(until) = skip_depth {
            depth += opens - closes;
            if depth <= until {
                skip_depth = None;
            }
            continue;
        }

        let top_level = depth == 0;
        let guarded = guard_depth > 0 && depth >= guard_depth;
        if top_level && !guarded && EXPORTS_LINE_RE.is_match(trimmed) {
            depth += opens - closes;
            if depth > 0 {
                // Multi-line export object: skip until it closes.
                skip_depth = Some(0);
            }
            continue;
        }

        depth += opens - closes;
        if guard_depth > 0 && depth < guard_depth {
            guard_depth = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Drop exact duplicates of top-level std-module require statements;
/// the first occurrence wins.
fn dedup_std_requires(source: &str) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        if STD_REQUIRE_LINE_RE.is_match(line) {
            let key = line.trim().to_string();
            if !seen.insert(key) {
                continue;
            }
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn check_no_relative_requires(source: &str) -> Result<()> {
    for line in source.lines() {
        if line.trim_start().starts_with("//") {
            continue;
        }
        if let Some(captures) = RELATIVE_REQUIRE_RE.captures(line) {
            return Err(Error::UnresolvedRequire {
                required: captures[1].to_string(),
                from: "bundled output".to_string(),
            });
        }
    }
    Ok(())
}

/// Reject mixing github-script runtime code with raw Node process
/// primitives pulled in by dependencies.
fn check_runtime_mixing(entry_source: &str, bundled: &str) -> Result<()> {
    let github_script = ["github.", "core.", "context."]
        .iter()
        .any(|g| entry_source.contains(g));
    if !github_script {
        return Ok(());
    }
    for primitive in ["child_process", "execSync"] {
        if let Some(line) = bundled
            .lines()
            .find(|l| !l.trim_start().starts_with("//") && l.contains(primitive))
        {
            return Err(Error::RuntimeConflict {
                module: line.trim().chars().take(80).collect(),
                primitive: primitive.to_string(),
            });
        }
    }
    Ok(())
}

fn check_line_lengths(source: &str) -> Result<()> {
    for (idx, line) in source.lines().enumerate() {
        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::LineTooLong {
                line: idx + 1,
                length: line.len(),
                limit: MAX_LINE_LENGTH,
            });
        }
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sources(files: &[(&str, &str)]) -> SourceMap {
        let mut map = SourceMap::new();
        for (path, source) in files {
            map.insert(*path, *source);
        }
        map
    }

    #[test]
    fn inlines_single_dependency() {
        let map = sources(&[
            ("main.cjs", "const { greet } = require(\"./lib.cjs\");\ngreet();\n"),
            ("lib.cjs", "function greet() {}\nmodule.exports = { greet };\n"),
        ]);
        let out = bundle("main.cjs", &map).unwrap();
        assert!(out.contains("function greet() {}"));
        assert!(!out.contains("require(\"./lib.cjs\")"));
        assert!(!out.contains("module.exports"));
    }

    #[test]
    fn module_inlined_once() {
        let map = sources(&[
            (
                "main.cjs",
                "const a = require(\"./a.cjs\");\nconst b = require(\"./b.cjs\");\n",
            ),
            ("a.cjs", "const shared = require(\"./shared.cjs\");\nconst A = 1;\n"),
            ("b.cjs", "const shared = require(\"./shared.cjs\");\nconst B = 2;\n"),
            ("shared.cjs", "const SHARED = 42;\n"),
        ]);
        let out = bundle("main.cjs", &map).unwrap();
        assert_eq!(out.matches("const SHARED = 42;").count(), 1);
        assert!(out.contains("// bundled: shared.cjs"));
    }

    #[test]
    fn parent_relative_require_resolves() {
        let map = sources(&[
            ("jobs/main.cjs", "require(\"../util/log.cjs\");\n"),
            ("util/log.cjs", "function log() {}\n"),
        ]);
        let out = bundle("jobs/main.cjs", &map).unwrap();
        assert!(out.contains("function log() {}"));
    }

    #[test]
    fn extension_appended_when_missing() {
        let map = sources(&[
            ("main.cjs", "require(\"./lib\");\n"),
            ("lib.cjs", "const L = 1;\n"),
        ]);
        assert!(bundle("main.cjs", &map).unwrap().contains("const L = 1;"));
    }

    #[test]
    fn unresolved_require_fails() {
        let map = sources(&[("main.cjs", "require(\"./missing.cjs\");\n")]);
        assert!(matches!(
            bundle("main.cjs", &map),
            Err(Error::UnresolvedRequire { .. })
        ));
    }

    #[test]
    fn exports_dot_assignments_stripped() {
        let map = sources(&[
            ("main.cjs", "require(\"./lib.cjs\");\n"),
            ("lib.cjs", "function f() {}\nexports.f = f;\n"),
        ]);
        let out = bundle("main.cjs", &map).unwrap();
        assert!(!out.contains("exports.f"));
    }

    #[test]
    fn multiline_exports_object_stripped() {
        let map = sources(&[
            ("main.cjs", "require(\"./lib.cjs\");\n"),
            (
                "lib.cjs",
                "function f() {}\nmodule.exports = {\n  f,\n  g: 1,\n};\nconst AFTER = 1;\n",
            ),
        ]);
        let out = bundle("main.cjs", &map).unwrap();
        assert!(!out.contains("g: 1"));
        assert!(out.contains("const AFTER = 1;"));
    }

    #[test]
    fn conditional_exports_preserved() {
        let guard = "if (typeof module !== \"undefined\" && module.exports) {\n  module.exports = { f };\n}\n";
        let map = sources(&[
            ("main.cjs", "require(\"./lib.cjs\");\n"),
            ("lib.cjs", &format!("function f() {{}}\n{guard}")),
        ]);
        let out = bundle("main.cjs", &map).unwrap();
        assert!(out.contains("typeof module"));
        assert!(out.contains("module.exports = { f };"));
    }

    #[test]
    fn duplicate_std_requires_deduped() {
        let map = sources(&[
            ("main.cjs", "const fs = require(\"fs\");\nrequire(\"./lib.cjs\");\n"),
            ("lib.cjs", "const fs = require(\"fs\");\nconst L = 1;\n"),
        ]);
        let out = bundle("main.cjs", &map).unwrap();
        assert_eq!(out.matches("const fs = require(\"fs\");").count(), 1);
    }

    #[test]
    fn over_long_line_rejected() {
        let long = format!("const s = \"{}\";\n", "x".repeat(MAX_LINE_LENGTH + 1));
        let map = sources(&[("main.cjs", long.as_str())]);
        assert!(matches!(
            bundle("main.cjs", &map),
            Err(Error::LineTooLong { .. })
        ));
    }

    #[test]
    fn runtime_mixing_rejected() {
        let map = sources(&[
            (
                "main.cjs",
                "core.info(\"start\");\nrequire(\"./shell.cjs\");\n",
            ),
            (
                "shell.cjs",
                "const { execSync } = require(\"child_process\");\n",
            ),
        ]);
        assert!(matches!(
            bundle("main.cjs", &map),
            Err(Error::RuntimeConflict { .. })
        ));
    }

    #[test]
    fn node_entry_may_use_child_process() {
        let map = sources(&[(
            "main.cjs",
            "const { execSync } = require(\"child_process\");\nexecSync(\"ls\");\n",
        )]);
        assert!(bundle("main.cjs", &map).is_ok());
    }
}
