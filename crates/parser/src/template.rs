//! Template directive scanning for Markdown bodies.
//!
//! Recognizes `{{#import path}}` inclusion directives and `{{#if expr}}` /
//! `{{/if}}` conditional regions. Lines are 1-based and relative to the body.

use std::sync::LazyLock;

use regex::Regex;

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{\{#import\s+([^}\s]+)\s*\}\}").expect("import directive regex")
});

static IF_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{\{#if\b[^}]*\}\}").expect("if-open directive regex")
});

/// An inline `{{#import …}}` directive found in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirective {
    /// The reference exactly as written (local path or `owner/repo/path@ref`).
    pub reference: String,
    /// 1-based body line of the directive.
    pub line: usize,
}

/// A `{{#if}}…{{/if}}` region, by body line span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionalRegion {
    pub start_line: usize,
    pub end_line: usize,
}

/// Collect all `{{#import}}` directives in body order.
#[must_use]
pub fn scan_imports(body: &str) -> Vec<ImportDirective> {
    let mut directives = Vec::new();
    for (idx, line) in body.lines().enumerate() {
        for captures in IMPORT_RE.captures_iter(line) {
            if let Some(reference) = captures.get(1) {
                directives.push(ImportDirective {
                    reference: reference.as_str().to_string(),
                    line: idx + 1,
                });
            }
        }
    }
    directives
}

/// Collect conditional regions. Nested `{{#if}}` blocks extend the enclosing
/// region; an unclosed region runs to the end of the body.
#[must_use]
pub fn scan_conditionals(body: &str) -> Vec<ConditionalRegion> {
    let mut regions = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut last_line = 0usize;

    for (idx, line) in body.lines().enumerate() {
        let line_no = idx + 1;
        last_line = line_no;
        let opens = IF_OPEN_RE.find_iter(line).count();
        let closes = line.matches("{{/if}}").count();
        if depth == 0 && opens > 0 {
            start = line_no;
        }
        depth += opens;
        if closes >= depth {
            if depth > 0 {
                regions.push(ConditionalRegion {
                    start_line: start,
                    end_line: line_no,
                });
            }
            depth = 0;
        } else {
            depth -= closes;
        }
    }

    if depth > 0 {
        regions.push(ConditionalRegion {
            start_line: start,
            end_line: last_line,
        });
    }
    regions
}

/// Imports that sit inside a conditional region.
#[must_use]
pub fn imports_inside_conditionals(body: &str) -> Vec<ImportDirective> {
    let regions = scan_conditionals(body);
    scan_imports(body)
        .into_iter()
        .filter(|directive| {
            regions
                .iter()
                .any(|r| directive.line >= r.start_line && directive.line <= r.end_line)
        })
        .collect()
}

/// Replace each `{{#import}}` directive line with resolved content.
///
/// `resolve` maps a reference to its already-expanded body text; the
/// substitution preserves surrounding lines byte-for-byte.
pub fn expand_imports(body: &str, mut resolve: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(body.len());
    for line in body.split_inclusive('\n') {
        if let Some(captures) = IMPORT_RE.captures(line) {
            if let Some(reference) = captures.get(1) {
                out.push_str(&resolve(reference.as_str()));
                if !out.ends_with('\n') && line.ends_with('\n') {
                    out.push('\n');
                }
                continue;
            }
        }
        out.push_str(line);
    }
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_imports_with_lines() {
        let body = "a\n{{#import shared/tools.md}}\nb\n{{#import octo/repo/x.md@main}}\n";
        let found = scan_imports(body);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].reference, "shared/tools.md");
        assert_eq!(found[0].line, 2);
        assert_eq!(found[1].reference, "octo/repo/x.md@main");
        assert_eq!(found[1].line, 4);
    }

    #[test]
    fn conditional_region_spans() {
        let body = "x\n{{#if github.event_name}}\ninner\n{{/if}}\ny\n";
        let regions = scan_conditionals(body);
        assert_eq!(regions, vec![ConditionalRegion { start_line: 2, end_line: 4 }]);
    }

    #[test]
    fn unclosed_region_runs_to_end() {
        let body = "{{#if x}}\na\nb\n";
        let regions = scan_conditionals(body);
        assert_eq!(regions[0].end_line, 3);
    }

    #[test]
    fn import_inside_if_detected() {
        let body = "{{#if x}}\n{{#import a.md}}\n{{/if}}\n{{#import b.md}}\n";
        let inside = imports_inside_conditionals(body);
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].reference, "a.md");
    }

    #[test]
    fn expand_replaces_directive() {
        let body = "before\n{{#import a.md}}\nafter\n";
        let out = expand_imports(body, |r| format!("<<{r}>>"));
        assert_eq!(out, "before\n<<a.md>>\nafter\n");
    }

    #[test]
    fn expand_keeps_plain_lines() {
        let body = "no directives here\n";
        assert_eq!(expand_imports(body, |_| String::new()), body);
    }
}
