//! Frontmatter merge semantics for imports.
//!
//! The merge is a pure tree operation over YAML values with a policy keyed
//! by field path. "Importer" is the file doing the importing; it always
//! outranks what it imports. Multiple imports fold left-to-right, so a
//! later import outranks an earlier one.
//!
//! Policy summary:
//! - `tools`: deep merge per tool; importer wins per key; `allowed` arrays
//!   are unioned and deduplicated; entries carrying `mcp:` replace wholesale.
//! - `network.allowed`: union, dedup, sort.
//! - `permissions`, `engine`, `on`: importer wins outright.
//! - `safe-outputs`: per-type importer wins; imported-only types are added.
//! - `steps`: imported steps first, importer steps appended after.
//! - everything else: importer wins when present.

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// Merge `importer` on top of `imported`, returning the effective
/// frontmatter.
pub fn merge_frontmatter(imported: &Value, importer: &Value) -> Result<Value> {
    let base = as_mapping(imported, "imported frontmatter")?;
    let over = as_mapping(importer, "frontmatter")?;

    let mut merged = Mapping::new();

    // Start from the imported mapping so imported-only fields survive.
    for (key, value) in base {
        merged.insert(key.clone(), value.clone());
    }

    for (key, over_value) in over {
        let Some(name) = key.as_str() else {
            merged.insert(key.clone(), over_value.clone());
            continue;
        };
        let merged_value = match (merged.get(name), name) {
            (Some(base_value), "tools") => merge_tools(base_value, over_value)?,
            (Some(base_value), "network") => merge_network(base_value, over_value)?,
            (Some(base_value), "safe-outputs") => merge_shallow_map(base_value, over_value, name)?,
            (Some(base_value), "env") => merge_shallow_map(base_value, over_value, name)?,
            (Some(base_value), "steps") => concat_sequences(base_value, over_value, name)?,
            // permissions / engine / on / scalars: importer wins.
            _ => over_value.clone(),
        };
        merged.insert(key.clone(), merged_value);
    }

    Ok(Value::Mapping(merged))
}

fn as_mapping<'a>(value: &'a Value, what: &str) -> Result<&'a Mapping> {
    match value {
        Value::Mapping(m) => Ok(m),
        Value::Null => {
            // An absent frontmatter merges as empty.
            static EMPTY: std::sync::LazyLock<Mapping> = std::sync::LazyLock::new(Mapping::new);
            Ok(&EMPTY)
        },
        other => Err(Error::Merge {
            path: what.to_string(),
            left: "mapping",
            right: type_name(other),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

// ── tools ───────────────────────────────────────────────────────────────────

fn merge_tools(base: &Value, over: &Value) -> Result<Value> {
    let (base, over) = both_mappings(base, over, "tools")?;
    let mut merged = base.clone();
    for (key, over_tool) in over {
        let replace = has_mcp(over_tool) || merged.get(key).is_none_or(|b| has_mcp(b));
        let merged_tool = if replace {
            over_tool.clone()
        } else if let Some(base_tool) = merged.get(key) {
            merge_tool_entry(base_tool, over_tool)
        } else {
            over_tool.clone()
        };
        merged.insert(key.clone(), merged_tool);
    }
    Ok(Value::Mapping(merged))
}

fn has_mcp(tool: &Value) -> bool {
    tool.as_mapping().is_some_and(|m| m.contains_key("mcp"))
}

/// Deep-merge one tool's options: importer wins per key, except `allowed`
/// lists which are unioned.
fn merge_tool_entry(base: &Value, over: &Value) -> Value {
    match (base, over) {
        (Value::Mapping(base), Value::Mapping(over)) => {
            let mut merged = base.clone();
            for (key, over_value) in over {
                let value = match (merged.get(key), key.as_str()) {
                    (Some(base_value), Some("allowed")) => union_lists(base_value, over_value),
                    (Some(base_value), _)
                        if base_value.is_mapping() && over_value.is_mapping() =>
                    {
                        merge_tool_entry(base_value, over_value)
                    },
                    _ => over_value.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Value::Mapping(merged)
        },
        // null enables a tool with defaults; a configured side wins over null.
        (configured, Value::Null) => configured.clone(),
        _ => over.clone(),
    }
}

/// Union two lists preserving first-seen order.
fn union_lists(base: &Value, over: &Value) -> Value {
    let mut seen = Vec::new();
    for value in [base, over] {
        if let Value::Sequence(items) = value {
            for item in items {
                if !seen.contains(item) {
                    seen.push(item.clone());
                }
            }
        }
    }
    Value::Sequence(seen)
}

// ── network ─────────────────────────────────────────────────────────────────

fn merge_network(base: &Value, over: &Value) -> Result<Value> {
    let (base, over) = both_mappings(base, over, "network")?;
    let mut merged = base.clone();
    for (key, over_value) in over {
        let value = match (merged.get(key), key.as_str()) {
            (Some(base_value), Some("allowed")) => {
                // Union, dedup, sort: allowed domains have no semantic order.
                let mut domains: Vec<String> = Vec::new();
                for list in [base_value, over_value] {
                    if let Value::Sequence(items) = list {
                        for item in items {
                            if let Some(s) = item.as_str()
                                && !domains.iter().any(|d| d == s)
                            {
                                domains.push(s.to_string());
                            }
                        }
                    }
                }
                domains.sort();
                Value::Sequence(domains.into_iter().map(Value::String).collect())
            },
            _ => over_value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    Ok(Value::Mapping(merged))
}

// ── generic helpers ─────────────────────────────────────────────────────────

/// Shallow map merge: importer wins per key, imported-only keys are kept.
fn merge_shallow_map(base: &Value, over: &Value, path: &str) -> Result<Value> {
    let (base, over) = both_mappings(base, over, path)?;
    let mut merged = base.clone();
    for (key, value) in over {
        merged.insert(key.clone(), value.clone());
    }
    Ok(Value::Mapping(merged))
}

/// Imported entries first, importer's entries appended.
fn concat_sequences(base: &Value, over: &Value, path: &str) -> Result<Value> {
    match (base, over) {
        (Value::Sequence(base), Value::Sequence(over)) => {
            let mut merged = base.clone();
            merged.extend(over.iter().cloned());
            Ok(Value::Sequence(merged))
        },
        (Value::Null, other) | (other, Value::Null) => Ok(other.clone()),
        (left, right) => Err(Error::Merge {
            path: path.to_string(),
            left: type_name(left),
            right: type_name(right),
        }),
    }
}

fn both_mappings<'a>(base: &'a Value, over: &'a Value, path: &str) -> Result<(&'a Mapping, &'a Mapping)> {
    static EMPTY: std::sync::LazyLock<Mapping> = std::sync::LazyLock::new(Mapping::new);
    let base = match base {
        Value::Mapping(m) => m,
        Value::Null => &EMPTY,
        other => {
            return Err(Error::Merge {
                path: path.to_string(),
                left: type_name(other),
                right: "mapping",
            });
        },
    };
    let over = match over {
        Value::Mapping(m) => m,
        Value::Null => &EMPTY,
        other => {
            return Err(Error::Merge {
                path: path.to_string(),
                left: "mapping",
                right: type_name(other),
            });
        },
    };
    Ok((base, over))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn importer_wins_scalars() {
        let merged = merge_frontmatter(
            &yaml("engine: claude\nname: base"),
            &yaml("engine: copilot"),
        )
        .unwrap();
        assert_eq!(merged["engine"], yaml("copilot"));
        assert_eq!(merged["name"], yaml("base"));
    }

    #[test]
    fn tools_allowed_unioned() {
        let merged = merge_frontmatter(
            &yaml("tools:\n  bash:\n    allowed: [\"git *\", \"ls\"]"),
            &yaml("tools:\n  bash:\n    allowed: [\"ls\", \"cat *\"]"),
        )
        .unwrap();
        let allowed = &merged["tools"]["bash"]["allowed"];
        assert_eq!(allowed, &yaml("[\"git *\", \"ls\", \"cat *\"]"));
    }

    #[test]
    fn tools_importer_wins_per_key() {
        let merged = merge_frontmatter(
            &yaml("tools:\n  github:\n    toolset: default\n  playwright:"),
            &yaml("tools:\n  github:\n    toolset: all"),
        )
        .unwrap();
        assert_eq!(merged["tools"]["github"]["toolset"], yaml("all"));
        assert!(merged["tools"].as_mapping().unwrap().contains_key("playwright"));
    }

    #[test]
    fn mcp_entries_replace_wholesale() {
        let merged = merge_frontmatter(
            &yaml("tools:\n  tavily:\n    mcp:\n      url: https://old\n      headers: {A: b}"),
            &yaml("tools:\n  tavily:\n    mcp:\n      url: https://new"),
        )
        .unwrap();
        let mcp = merged["tools"]["tavily"]["mcp"].as_mapping().unwrap();
        assert_eq!(mcp.get("url"), Some(&yaml("https://new")));
        assert!(!mcp.contains_key("headers"));
    }

    #[test]
    fn network_allowed_union_sorted() {
        let merged = merge_frontmatter(
            &yaml("network:\n  allowed: [example.com, defaults]"),
            &yaml("network:\n  allowed: [api.example.com, example.com]"),
        )
        .unwrap();
        assert_eq!(
            merged["network"]["allowed"],
            yaml("[api.example.com, defaults, example.com]")
        );
    }

    #[test]
    fn safe_outputs_types_added_and_overridden() {
        let merged = merge_frontmatter(
            &yaml("safe-outputs:\n  create-issue:\n    max: 1\n  add-comment:"),
            &yaml("safe-outputs:\n  create-issue:\n    max: 5"),
        )
        .unwrap();
        assert_eq!(merged["safe-outputs"]["create-issue"]["max"], yaml("5"));
        assert!(
            merged["safe-outputs"]
                .as_mapping()
                .unwrap()
                .contains_key("add-comment")
        );
    }

    #[test]
    fn steps_concatenate_imported_first() {
        let merged = merge_frontmatter(
            &yaml("steps:\n  - run: setup"),
            &yaml("steps:\n  - run: build"),
        )
        .unwrap();
        let steps = merged["steps"].as_sequence().unwrap();
        assert_eq!(steps[0]["run"], yaml("setup"));
        assert_eq!(steps[1]["run"], yaml("build"));
    }

    #[test]
    fn incompatible_types_error() {
        let err = merge_frontmatter(
            &yaml("network: {allowed: []}"),
            &yaml("network: \"all\""),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Merge { .. }));
    }

    #[test]
    fn null_imported_frontmatter_ok() {
        let merged = merge_frontmatter(&Value::Null, &yaml("engine: copilot")).unwrap();
        assert_eq!(merged["engine"], yaml("copilot"));
    }
}
