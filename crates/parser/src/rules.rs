//! Custom validation rules layered on top of the structural schema.
//!
//! Covers trigger conflict detection, engine-specific restrictions, and the
//! additional checks enabled by `strict: true`.

use {
    ghaw_common::Diagnostic,
    serde_yaml::Value,
};

use crate::{
    split::{SplitSpec, line_of_key},
    template,
};

/// Events that may be combined with `command:` / `alias:` triggers.
///
/// Command workflows react to conversational surfaces; pairing them with
/// content triggers (push, pull_request) or schedules produces workflows
/// whose activation condition is ambiguous, so those pairings are rejected.
const COMMAND_COMPATIBLE_EVENTS: &[&str] = &[
    "discussion",
    "discussion_comment",
    "issue_comment",
    "issues",
    "pull_request_review_comment",
    "workflow_dispatch",
];

/// Permission scopes that may carry `write` when `strict: true`.
const STRICT_WRITE_ALLOWLIST: &[&str] = &["discussions", "issues", "pull-requests"];

/// Apply all custom rules to a frontmatter mapping plus Markdown body.
#[must_use]
pub fn check_rules(frontmatter: &Value, body: &str, split: &SplitSpec) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let Some(mapping) = frontmatter.as_mapping() else {
        return diagnostics;
    };

    if let Some(on) = mapping.get("on") {
        check_trigger_conflicts(on, split, &mut diagnostics);
    }
    check_engine_rules(mapping, split, &mut diagnostics);

    let strict = mapping
        .get("strict")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if strict {
        check_strict(mapping, body, split, &mut diagnostics);
    }

    diagnostics
}

fn locate(split: &SplitSpec, diagnostic: Diagnostic) -> Diagnostic {
    match line_of_key(split, &diagnostic.path) {
        Some(line) => diagnostic.at(line, None),
        None => diagnostic,
    }
}

// ── Trigger conflicts ───────────────────────────────────────────────────────

fn check_trigger_conflicts(on: &Value, split: &SplitSpec, diagnostics: &mut Vec<Diagnostic>) {
    let Some(mapping) = on.as_mapping() else {
        return;
    };

    let keys: Vec<&str> = mapping.keys().filter_map(Value::as_str).collect();
    let has_command = keys.contains(&"command") || keys.contains(&"slash_command");
    let has_alias = keys.contains(&"alias");

    if has_command && has_alias {
        diagnostics.push(locate(
            split,
            Diagnostic::error(
                "rule",
                "on.alias",
                "`command` and `alias` cannot be combined",
            ),
        ));
    }

    if has_command || has_alias {
        let kind = if has_command { "command" } else { "alias" };
        for key in &keys {
            if matches!(*key, "command" | "slash_command" | "alias")
                || COMMAND_COMPATIBLE_EVENTS.contains(key)
                || super::schema::SYNTHETIC_TRIGGER_KEYS.contains(key)
            {
                continue;
            }
            diagnostics.push(locate(
                split,
                Diagnostic::error(
                    "rule",
                    format!("on.{key}"),
                    format!("`{kind}` cannot be combined with the `{key}` trigger"),
                ),
            ));
        }
    }
}

// ── Engine rules ────────────────────────────────────────────────────────────

fn engine_id(mapping: &serde_yaml::Mapping) -> Option<&str> {
    match mapping.get("engine") {
        Some(Value::String(id)) => Some(id.as_str()),
        Some(Value::Mapping(m)) => m.get("id").and_then(Value::as_str),
        _ => None,
    }
}

fn check_engine_rules(
    mapping: &serde_yaml::Mapping,
    split: &SplitSpec,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match engine_id(mapping) {
        Some("codex") => {
            let has_web_search = mapping
                .get("tools")
                .and_then(Value::as_mapping)
                .is_some_and(|tools| tools.contains_key("web-search"));
            if has_web_search {
                diagnostics.push(locate(
                    split,
                    Diagnostic::error(
                        "rule",
                        "tools.web-search",
                        "the codex engine does not support the web-search tool",
                    ),
                ));
            }
        },
        Some("custom") => {
            let has_steps = mapping
                .get("steps")
                .and_then(Value::as_sequence)
                .is_some_and(|s| !s.is_empty());
            if !has_steps {
                diagnostics.push(locate(
                    split,
                    Diagnostic::error(
                        "rule",
                        "engine",
                        "engine `custom` requires at least one entry under `steps`",
                    ),
                ));
            }
        },
        _ => {},
    }
}

// ── Strict mode ─────────────────────────────────────────────────────────────

fn check_strict(
    mapping: &serde_yaml::Mapping,
    body: &str,
    split: &SplitSpec,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Write permissions beyond the allowlist.
    if let Some(permissions) = mapping.get("permissions") {
        match permissions {
            Value::String(s) if s == "write-all" => {
                diagnostics.push(locate(
                    split,
                    Diagnostic::error(
                        "rule",
                        "permissions",
                        "strict mode forbids `permissions: write-all`",
                    ),
                ));
            },
            Value::Mapping(perms) => {
                for (scope, level) in perms {
                    let (Some(scope), Some(level)) = (scope.as_str(), level.as_str()) else {
                        continue;
                    };
                    if level == "write" && !STRICT_WRITE_ALLOWLIST.contains(&scope) {
                        diagnostics.push(locate(
                            split,
                            Diagnostic::error(
                                "rule",
                                format!("permissions.{scope}"),
                                format!("strict mode forbids `{scope}: write`"),
                            )
                            .with_hint("request the write through safe-outputs instead"),
                        ));
                    }
                }
            },
            _ => {},
        }
    }

    // serena in local mode.
    if let Some(serena) = mapping
        .get("tools")
        .and_then(Value::as_mapping)
        .and_then(|tools| tools.get("serena"))
        && serena
            .as_mapping()
            .and_then(|m| m.get("mode"))
            .and_then(Value::as_str)
            == Some("local")
    {
        diagnostics.push(locate(
            split,
            Diagnostic::error(
                "rule",
                "tools.serena",
                "strict mode forbids the serena tool in local mode",
            ),
        ));
    }

    // Import directives inside conditional template regions.
    for directive in template::imports_inside_conditionals(body) {
        diagnostics.push(
            Diagnostic::error(
                "rule",
                "",
                format!(
                    "strict mode forbids {{{{#import}}}} inside {{{{#if}}}} regions ({})",
                    directive.reference
                ),
            )
            .at(directive.line + split.body_start_line.saturating_sub(1), None),
        );
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::split::split_source, ghaw_common::Severity};

    fn check(frontmatter: &str, body: &str) -> Vec<Diagnostic> {
        let source = format!("---\n{frontmatter}---\n{body}");
        let split = split_source(&source, "test.md").unwrap();
        let value: Value = serde_yaml::from_str(&split.frontmatter).unwrap();
        check_rules(&value, body, &split)
    }

    #[test]
    fn command_with_push_conflicts() {
        let diags = check("on:\n  command: bot\n  push: {}\n", "");
        assert!(diags.iter().any(|d| d.path == "on.push"));
    }

    #[test]
    fn command_with_issue_comment_ok() {
        let diags = check("on:\n  command: bot\n  issue_comment: {}\n", "");
        assert!(diags.is_empty(), "unexpected: {diags:?}");
    }

    #[test]
    fn command_and_alias_conflict() {
        let diags = check("on:\n  command: bot\n  alias: my-bot\n", "");
        assert!(diags.iter().any(|d| d.path == "on.alias"));
    }

    #[test]
    fn codex_rejects_web_search() {
        let diags = check("engine: codex\ntools:\n  web-search:\n", "");
        assert!(diags.iter().any(|d| d.path == "tools.web-search"));
    }

    #[test]
    fn custom_engine_requires_steps() {
        let diags = check("engine: custom\n", "");
        assert!(diags.iter().any(|d| d.path == "engine"));
        let diags = check("engine: custom\nsteps:\n  - run: make\n", "");
        assert!(diags.is_empty(), "unexpected: {diags:?}");
    }

    #[test]
    fn strict_rejects_contents_write() {
        let diags = check("strict: true\npermissions:\n  contents: write\n", "");
        let d = diags.iter().find(|d| d.path == "permissions.contents").unwrap();
        assert_eq!(d.severity, Severity::Error);
        assert!(d.hint.is_some());
    }

    #[test]
    fn strict_allows_issues_write() {
        let diags = check("strict: true\npermissions:\n  issues: write\n", "");
        assert!(diags.is_empty(), "unexpected: {diags:?}");
    }

    #[test]
    fn lax_mode_allows_contents_write() {
        let diags = check("permissions:\n  contents: write\n", "");
        assert!(diags.is_empty());
    }

    #[test]
    fn strict_rejects_serena_local() {
        let diags = check("strict: true\ntools:\n  serena:\n    mode: local\n", "");
        assert!(diags.iter().any(|d| d.path == "tools.serena"));
    }

    #[test]
    fn strict_rejects_import_inside_if() {
        let body = "intro\n{{#if github.event}}\n{{#import shared/x.md}}\n{{/if}}\n";
        let diags = check("strict: true\n", body);
        let d = diags.iter().find(|d| d.message.contains("#import")).unwrap();
        // Body starts on file line 4, the directive is body line 3.
        assert_eq!(d.line, Some(6));
    }
}
