//! Structural frontmatter validation.
//!
//! Validates the parsed frontmatter tree against the known schema (main
//! workflow or included file), detects unknown/misspelled fields with
//! "did you mean" hints, and type-checks scalar leaves. All violations are
//! aggregated into diagnostics; nothing short-circuits.

use std::collections::HashMap;

use {
    ghaw_common::{Diagnostic, Severity},
    serde_yaml::Value,
};

use crate::split::{SplitSpec, line_of_key};

/// Which schema applies: a top-level workflow file or an imported fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// `.github/workflows/*.md` — full schema.
    Main,
    /// Imported files — no `on:`, no top-level `permissions:`.
    Included,
}

/// Recognized engine identifiers.
pub const ENGINE_IDS: &[&str] = &["copilot", "claude", "codex", "custom", "genaiscript"];

/// Safe-output types the planner understands.
pub const SAFE_OUTPUT_TYPES: &[&str] = &[
    "add-comment",
    "add-labels",
    "assign-to-agent",
    "close-discussion",
    "copy-project",
    "create-discussion",
    "create-issue",
    "create-pull-request",
    "create-pull-request-review-comment",
    "create-project-status-update",
    "dispatch-workflow",
    "max-patch-size",
    "messages",
    "push-to-pull-request-branch",
    "staged",
    "threat-detection",
    "update-issue",
    "update-project",
    "update-pull-request",
    "update-release",
    "upload-asset",
];

/// Standard GitHub Actions event names accepted under `on:`.
pub const EVENT_NAMES: &[&str] = &[
    "branch_protection_rule",
    "check_run",
    "check_suite",
    "create",
    "delete",
    "deployment",
    "deployment_status",
    "discussion",
    "discussion_comment",
    "fork",
    "gollum",
    "issue_comment",
    "issues",
    "label",
    "merge_group",
    "milestone",
    "page_build",
    "project",
    "public",
    "pull_request",
    "pull_request_review",
    "pull_request_review_comment",
    "pull_request_target",
    "push",
    "registry_package",
    "release",
    "repository_dispatch",
    "schedule",
    "status",
    "watch",
    "workflow_call",
    "workflow_dispatch",
    "workflow_run",
];

/// Synthetic `on:` keys handled by the compiler rather than by Actions.
pub const SYNTHETIC_TRIGGER_KEYS: &[&str] = &[
    "alias",
    "command",
    "reaction",
    "skip-if-match",
    "slash_command",
    "stop-after",
];

/// Tool names with built-in expansion.
pub const RESERVED_TOOLS: &[&str] = &[
    "agentic-workflows",
    "bash",
    "cache-memory",
    "edit",
    "github",
    "playwright",
    "repo-memory",
    "serena",
    "web-fetch",
    "web-search",
];

/// Permission levels accepted in the `permissions:` map.
const PERMISSION_LEVELS: &[&str] = &["read", "write", "none"];

/// Safe-output option keys shared across types.
const SAFE_OUTPUT_OPTION_KEYS: &[&str] = &[
    "allow-empty",
    "branch",
    "category",
    "close-older-discussions",
    "draft",
    "if-no-changes",
    "labels",
    "max",
    "steps",
    "target",
    "title-prefix",
];

// ── Schema tree ─────────────────────────────────────────────────────────────

/// Scalar type expected at a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafType {
    Str,
    Bool,
    Int,
}

/// Expected shape of a frontmatter subtree.
enum KnownKeys {
    /// A mapping with fixed field names.
    Struct(HashMap<&'static str, KnownKeys>),
    /// A mapping with dynamic keys whose values share one shape.
    Map(Box<KnownKeys>),
    /// A sequence of typed items.
    Array(Box<KnownKeys>),
    /// Scalar of a specific type.
    Leaf(LeafType),
    /// Anything — polymorphic fields validated by dedicated checks.
    Any,
}

fn build_schema(kind: SchemaKind) -> KnownKeys {
    use {
        KnownKeys::{Any, Array, Leaf, Map, Struct},
        LeafType::{Bool, Int, Str},
    };

    let network = || {
        Struct(HashMap::from([
            ("allowed", Array(Box::new(Leaf(Str)))),
            ("firewall", Leaf(Bool)),
            ("mode", Leaf(Str)),
        ]))
    };

    let governance = || {
        Struct(HashMap::from([
            ("max-runs-per-hour", Leaf(Int)),
            ("max-comments-per-run", Leaf(Int)),
            ("max-dispatches-per-run", Leaf(Int)),
        ]))
    };

    let mut fields = HashMap::from([
        ("name", Leaf(Str)),
        ("description", Leaf(Str)),
        ("engine", Any),
        ("network", network()),
        ("tools", Map(Box::new(Any))),
        ("safe-outputs", Any),
        ("imports", Array(Box::new(Leaf(Str)))),
        ("steps", Array(Box::new(Any))),
        ("timeout-minutes", Leaf(Int)),
        ("timeout_minutes", Leaf(Int)),
        ("strict", Leaf(Bool)),
        ("concurrency", Any),
        ("runs-on", Any),
        ("env", Map(Box::new(Leaf(Str)))),
        ("tracker-id", Leaf(Str)),
        ("project", Leaf(Str)),
        ("governance", governance()),
    ]);

    if kind == SchemaKind::Main {
        fields.insert("on", Any);
        fields.insert("permissions", Any);
    }

    Struct(fields)
}

// ── Levenshtein distance ────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Find the closest candidate within `max_distance` edits, if any.
pub(crate) fn suggest<'a>(
    needle: &str,
    candidates: &[&'a str],
    max_distance: usize,
) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a frontmatter value against the schema for `kind`.
///
/// `split` is used only to attach approximate source lines to diagnostics.
#[must_use]
pub fn validate_frontmatter(
    frontmatter: &Value,
    kind: SchemaKind,
    split: &SplitSpec,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(mapping) = frontmatter.as_mapping() else {
        if !frontmatter.is_null() {
            diagnostics.push(Diagnostic::error(
                "schema",
                "",
                "frontmatter must be a YAML mapping",
            ));
        }
        return diagnostics;
    };

    // Fields rejected outright by the included-file schema.
    if kind == SchemaKind::Included {
        for forbidden in ["on", "permissions"] {
            if mapping.contains_key(forbidden) {
                diagnostics.push(locate(
                    split,
                    Diagnostic::error(
                        "schema",
                        forbidden,
                        format!("`{forbidden}` is not allowed in imported files"),
                    ),
                ));
            }
        }
    }

    let schema = build_schema(kind);
    check_unknown_fields(frontmatter, &schema, "", split, &mut diagnostics);

    if let Some(engine) = mapping.get("engine") {
        check_engine(engine, split, &mut diagnostics);
    }
    if kind == SchemaKind::Main
        && let Some(permissions) = mapping.get("permissions")
    {
        check_permissions(permissions, split, &mut diagnostics);
    }
    if kind == SchemaKind::Main
        && let Some(on) = mapping.get("on")
    {
        check_triggers(on, split, &mut diagnostics);
    }
    if let Some(outputs) = mapping.get("safe-outputs") {
        check_safe_outputs(outputs, split, &mut diagnostics);
    }
    if mapping.contains_key("timeout-minutes")
        && mapping.contains_key("timeout_minutes")
    {
        diagnostics.push(locate(
            split,
            Diagnostic::warning(
                "schema",
                "timeout_minutes",
                "both `timeout-minutes` and `timeout_minutes` set; `timeout-minutes` wins",
            ),
        ));
    }

    diagnostics
}

fn locate(split: &SplitSpec, diagnostic: Diagnostic) -> Diagnostic {
    match line_of_key(split, &diagnostic.path) {
        Some(line) => diagnostic.at(line, None),
        None => diagnostic,
    }
}

fn key_str(key: &Value) -> Option<&str> {
    key.as_str()
}

/// Walk the frontmatter tree against the schema tree and flag unknown keys
/// and scalar type mismatches.
fn check_unknown_fields(
    value: &Value,
    schema: &KnownKeys,
    prefix: &str,
    split: &SplitSpec,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (value, schema) {
        (Value::Mapping(mapping), KnownKeys::Struct(fields)) => {
            let known_keys: Vec<&str> = fields.keys().copied().collect();
            for (key, child) in mapping {
                let Some(key) = key_str(key) else { continue };
                let path = join_path(prefix, key);
                if let Some(child_schema) = fields.get(key) {
                    check_unknown_fields(child, child_schema, &path, split, diagnostics);
                } else {
                    let mut d = Diagnostic::error("schema", path, "unknown field");
                    if let Some(s) = suggest(key, &known_keys, 3) {
                        d = d.with_hint(format!("did you mean \"{s}\"?"));
                    }
                    diagnostics.push(locate(split, d));
                }
            }
        },
        (Value::Mapping(mapping), KnownKeys::Map(value_schema)) => {
            for (key, child) in mapping {
                let Some(key) = key_str(key) else { continue };
                check_unknown_fields(child, value_schema, &join_path(prefix, key), split, diagnostics);
            }
        },
        (Value::Sequence(items), KnownKeys::Array(item_schema)) => {
            for (i, item) in items.iter().enumerate() {
                check_unknown_fields(item, item_schema, &format!("{prefix}[{i}]"), split, diagnostics);
            }
        },
        (_, KnownKeys::Leaf(expected)) => {
            check_leaf(value, *expected, prefix, split, diagnostics);
        },
        (_, KnownKeys::Any) => {},
        // Shape mismatch (mapping expected, scalar found, ...).
        (other, KnownKeys::Struct(_) | KnownKeys::Map(_)) if !other.is_null() => {
            if !matches!(other, Value::Mapping(_)) {
                diagnostics.push(locate(
                    split,
                    Diagnostic::error("schema", prefix, "expected a mapping"),
                ));
            }
        },
        (other, KnownKeys::Array(_)) if !other.is_null() => {
            diagnostics.push(locate(
                split,
                Diagnostic::error("schema", prefix, "expected a list"),
            ));
        },
        _ => {},
    }
}

fn check_leaf(
    value: &Value,
    expected: LeafType,
    path: &str,
    split: &SplitSpec,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if value.is_null() {
        return;
    }
    let ok = match expected {
        LeafType::Str => value.is_string(),
        LeafType::Bool => value.is_bool(),
        LeafType::Int => value.is_u64() || value.is_i64(),
    };
    if !ok {
        let want = match expected {
            LeafType::Str => "a string",
            LeafType::Bool => "a boolean",
            LeafType::Int => "an integer",
        };
        diagnostics.push(locate(
            split,
            Diagnostic::error("schema", path, format!("expected {want}")),
        ));
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

// ── Polymorphic field checks ────────────────────────────────────────────────

fn check_engine(engine: &Value, split: &SplitSpec, diagnostics: &mut Vec<Diagnostic>) {
    match engine {
        Value::String(id) => {
            if !ENGINE_IDS.contains(&id.as_str()) {
                let mut d = Diagnostic::error(
                    "schema",
                    "engine",
                    format!("unknown engine \"{id}\""),
                );
                if let Some(s) = suggest(id, ENGINE_IDS, 3) {
                    d = d.with_hint(format!("did you mean \"{s}\"?"));
                }
                diagnostics.push(locate(split, d));
            }
        },
        Value::Mapping(mapping) => {
            const ENGINE_KEYS: &[&str] = &["id", "model", "version", "max-turns", "env"];
            match mapping.get("id").and_then(Value::as_str) {
                Some(id) if !ENGINE_IDS.contains(&id) => {
                    diagnostics.push(locate(
                        split,
                        Diagnostic::error("schema", "engine.id", format!("unknown engine \"{id}\"")),
                    ));
                },
                Some(_) => {},
                None => diagnostics.push(locate(
                    split,
                    Diagnostic::error("schema", "engine.id", "engine mapping requires `id`"),
                )),
            }
            for key in mapping.keys().filter_map(key_str) {
                if !ENGINE_KEYS.contains(&key) {
                    let mut d = Diagnostic::error(
                        "schema",
                        format!("engine.{key}"),
                        "unknown field",
                    );
                    if let Some(s) = suggest(key, ENGINE_KEYS, 3) {
                        d = d.with_hint(format!("did you mean \"{s}\"?"));
                    }
                    diagnostics.push(locate(split, d));
                }
            }
        },
        _ => diagnostics.push(locate(
            split,
            Diagnostic::error("schema", "engine", "engine must be a string or mapping"),
        )),
    }
}

fn check_permissions(permissions: &Value, split: &SplitSpec, diagnostics: &mut Vec<Diagnostic>) {
    match permissions {
        Value::String(s) if s == "read-all" || s == "write-all" => {},
        Value::String(s) => diagnostics.push(locate(
            split,
            Diagnostic::error(
                "schema",
                "permissions",
                format!("unknown permissions shorthand \"{s}\" (expected read-all or write-all)"),
            ),
        )),
        Value::Mapping(mapping) => {
            for (scope, level) in mapping {
                let Some(scope) = key_str(scope) else { continue };
                let path = format!("permissions.{scope}");
                match level.as_str() {
                    Some(level) if PERMISSION_LEVELS.contains(&level) => {},
                    Some(level) => diagnostics.push(locate(
                        split,
                        Diagnostic::error(
                            "schema",
                            path,
                            format!(
                                "invalid permission level \"{level}\"; expected one of: {}",
                                PERMISSION_LEVELS.join(", ")
                            ),
                        ),
                    )),
                    None => diagnostics.push(locate(
                        split,
                        Diagnostic::error("schema", path, "permission level must be a string"),
                    )),
                }
            }
        },
        _ => diagnostics.push(locate(
            split,
            Diagnostic::error("schema", "permissions", "permissions must be a string or mapping"),
        )),
    }
}

fn check_triggers(on: &Value, split: &SplitSpec, diagnostics: &mut Vec<Diagnostic>) {
    match on {
        // Shorthand strings (schedule phrases, cron, "/command", event names)
        // are normalized later; nothing structural to check here.
        Value::String(_) => {},
        Value::Mapping(mapping) => {
            for key in mapping.keys().filter_map(key_str) {
                if EVENT_NAMES.contains(&key) || SYNTHETIC_TRIGGER_KEYS.contains(&key) {
                    continue;
                }
                let mut candidates: Vec<&str> = EVENT_NAMES.to_vec();
                candidates.extend_from_slice(SYNTHETIC_TRIGGER_KEYS);
                let mut d = Diagnostic::error(
                    "schema",
                    format!("on.{key}"),
                    format!("unknown trigger \"{key}\""),
                );
                if let Some(s) = suggest(key, &candidates, 3) {
                    d = d.with_hint(format!("did you mean \"{s}\"?"));
                }
                diagnostics.push(locate(split, d));
            }
        },
        _ => diagnostics.push(locate(
            split,
            Diagnostic::error("schema", "on", "`on` must be a string or mapping"),
        )),
    }
}

fn check_safe_outputs(outputs: &Value, split: &SplitSpec, diagnostics: &mut Vec<Diagnostic>) {
    let Some(mapping) = outputs.as_mapping() else {
        if !outputs.is_null() {
            diagnostics.push(locate(
                split,
                Diagnostic::error("schema", "safe-outputs", "safe-outputs must be a mapping"),
            ));
        }
        return;
    };

    for (key, config) in mapping {
        let Some(name) = key_str(key) else { continue };
        let path = format!("safe-outputs.{name}");
        if !SAFE_OUTPUT_TYPES.contains(&name) {
            let mut d = Diagnostic::error(
                "schema",
                path.clone(),
                format!("unknown safe-output type \"{name}\""),
            );
            if let Some(s) = suggest(name, SAFE_OUTPUT_TYPES, 3) {
                d = d.with_hint(format!("did you mean \"{s}\"?"));
            }
            diagnostics.push(locate(split, d));
            continue;
        }
        // Scalar entries carry their value directly.
        match name {
            "max-patch-size" => {
                if !(config.is_u64() || config.is_null()) {
                    diagnostics.push(locate(
                        split,
                        Diagnostic::error("schema", path, "max-patch-size must be an integer"),
                    ));
                }
                continue;
            },
            "staged" => {
                if !(config.is_bool() || config.is_null()) {
                    diagnostics.push(locate(
                        split,
                        Diagnostic::error("schema", path, "staged must be a boolean"),
                    ));
                }
                continue;
            },
            _ => {},
        }
        if let Some(options) = config.as_mapping() {
            for option in options.keys().filter_map(key_str) {
                if !SAFE_OUTPUT_OPTION_KEYS.contains(&option) {
                    let mut d = Diagnostic::new(
                        Severity::Warning,
                        "schema",
                        format!("{path}.{option}"),
                        "unknown safe-output option",
                    );
                    if let Some(s) = suggest(option, SAFE_OUTPUT_OPTION_KEYS, 3) {
                        d = d.with_hint(format!("did you mean \"{s}\"?"));
                    }
                    diagnostics.push(locate(split, d));
                }
            }
            if let Some(mode) = options
                .get("if-no-changes")
                .and_then(Value::as_str)
                && !["warn", "error", "ignore"].contains(&mode)
            {
                diagnostics.push(locate(
                    split,
                    Diagnostic::error(
                        "schema",
                        format!("{path}.if-no-changes"),
                        format!("invalid value \"{mode}\"; expected warn, error, or ignore"),
                    ),
                ));
            }
        } else if !config.is_null() {
            diagnostics.push(locate(
                split,
                Diagnostic::error("schema", path, "safe-output entry must be null or a mapping"),
            ));
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::split::split_source};

    fn validate_str(frontmatter: &str, kind: SchemaKind) -> Vec<Diagnostic> {
        let source = format!("---\n{frontmatter}---\nbody\n");
        let split = split_source(&source, "test.md").unwrap();
        let value: Value = serde_yaml::from_str(&split.frontmatter).unwrap();
        validate_frontmatter(&value, kind, &split)
    }

    fn errors(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
        diags.iter().filter(|d| d.severity == Severity::Error).collect()
    }

    #[test]
    fn valid_minimal_spec() {
        let diags = validate_str("on: push\nengine: copilot\n", SchemaKind::Main);
        assert!(errors(&diags).is_empty(), "unexpected: {diags:?}");
    }

    #[test]
    fn unknown_top_level_key_suggested() {
        let diags = validate_str("on: push\nengne: copilot\n", SchemaKind::Main);
        let d = errors(&diags)
            .into_iter()
            .find(|d| d.path == "engne")
            .expect("unknown-field diagnostic");
        assert!(d.hint.as_ref().unwrap().contains("engine"));
        assert_eq!(d.line, Some(3));
    }

    #[test]
    fn unknown_engine_suggested() {
        let diags = validate_str("engine: copilott\n", SchemaKind::Main);
        let d = errors(&diags).into_iter().find(|d| d.path == "engine").unwrap();
        assert!(d.hint.as_ref().unwrap().contains("copilot"));
    }

    #[test]
    fn engine_mapping_requires_id() {
        let diags = validate_str("engine:\n  model: gpt-5\n", SchemaKind::Main);
        assert!(errors(&diags).iter().any(|d| d.path == "engine.id"));
    }

    #[test]
    fn included_schema_rejects_on_and_permissions() {
        let diags = validate_str("on: push\npermissions:\n  contents: read\n", SchemaKind::Included);
        let errs = errors(&diags);
        assert!(errs.iter().any(|d| d.path == "on"));
        assert!(errs.iter().any(|d| d.path == "permissions"));
    }

    #[test]
    fn bad_permission_level() {
        let diags = validate_str("permissions:\n  contents: admin\n", SchemaKind::Main);
        assert!(errors(&diags).iter().any(|d| d.path == "permissions.contents"));
    }

    #[test]
    fn permissions_shorthand_accepted() {
        let diags = validate_str("permissions: read-all\n", SchemaKind::Main);
        assert!(errors(&diags).is_empty());
    }

    #[test]
    fn unknown_trigger_suggested() {
        let diags = validate_str("on:\n  isses: {}\n", SchemaKind::Main);
        let d = errors(&diags).into_iter().find(|d| d.path == "on.isses").unwrap();
        assert!(d.hint.as_ref().unwrap().contains("issues"));
    }

    #[test]
    fn synthetic_triggers_accepted() {
        let diags = validate_str(
            "on:\n  command: my-bot\n  stop-after: \"2027-01-01\"\n",
            SchemaKind::Main,
        );
        assert!(errors(&diags).is_empty(), "unexpected: {diags:?}");
    }

    #[test]
    fn unknown_safe_output_type_suggested() {
        let diags = validate_str("safe-outputs:\n  create-isue:\n", SchemaKind::Main);
        let d = errors(&diags)
            .into_iter()
            .find(|d| d.path == "safe-outputs.create-isue")
            .unwrap();
        assert!(d.hint.as_ref().unwrap().contains("create-issue"));
    }

    #[test]
    fn safe_output_scalar_entries_type_checked() {
        let diags = validate_str(
            "safe-outputs:\n  max-patch-size: big\n  staged: yes\n",
            SchemaKind::Main,
        );
        let errs = errors(&diags);
        assert!(errs.iter().any(|d| d.path == "safe-outputs.max-patch-size"));
        // `yes` parses as a YAML boolean, so staged is fine.
        assert!(!errs.iter().any(|d| d.path == "safe-outputs.staged"));
    }

    #[test]
    fn if_no_changes_enum_checked() {
        let diags = validate_str(
            "safe-outputs:\n  push-to-pull-request-branch:\n    if-no-changes: explode\n",
            SchemaKind::Main,
        );
        assert!(
            errors(&diags)
                .iter()
                .any(|d| d.path.ends_with("if-no-changes"))
        );
    }

    #[test]
    fn three_violations_all_reported() {
        let diags = validate_str(
            "engine: copilott\nnetwork:\n  allowed: defaults\nsafe-outputs:\n  create-isue:\n",
            SchemaKind::Main,
        );
        // Bad engine, network.allowed not a list, unknown safe-output type.
        assert!(errors(&diags).len() >= 3, "got: {diags:?}");
    }

    #[test]
    fn dual_timeout_warned() {
        let diags = validate_str("timeout-minutes: 5\ntimeout_minutes: 6\n", SchemaKind::Main);
        assert!(diags.iter().any(|d| d.severity == Severity::Warning));
    }

    #[test]
    fn tools_map_is_open() {
        let diags = validate_str(
            "tools:\n  github:\n  my-server:\n    mcp:\n      command: node\n",
            SchemaKind::Main,
        );
        assert!(errors(&diags).is_empty(), "unexpected: {diags:?}");
    }

    #[test]
    fn suggest_respects_distance() {
        assert_eq!(suggest("copilott", ENGINE_IDS, 3), Some("copilot"));
        assert_eq!(suggest("zzzzzz", ENGINE_IDS, 3), None);
    }
}
