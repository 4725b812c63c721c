//! Deterministic serialization of a [`WorkflowPlan`] to `.lock.yml` text.
//!
//! The writer is hand-rolled rather than serde-driven: lock files carry a
//! generator header, per-cron phrase comments, and literal-block script
//! embedding, none of which a generic YAML serializer produces. Key order
//! is fixed, every map is traversed sorted, and output always ends with a
//! newline, so identical inputs re-emit byte-identical files.

use std::fmt::Write as _;

use {
    serde_yaml::Value,
    sha2::{Digest, Sha256},
};

use crate::{
    error::{Error, Result},
    jobs::{Job, Step, WorkflowPlan},
};

/// Tool signature placed on the first line of every lock file.
const GENERATOR_SIGNATURE: &str = concat!("gh-aw ", env!("CARGO_PKG_VERSION"));

/// Serialize the plan. `source_path` and `source` identify the spec this
/// lock file was compiled from.
pub fn emit_workflow(plan: &WorkflowPlan, source_path: &str, source: &str) -> Result<String> {
    let mut out = String::new();

    let digest = Sha256::digest(source.as_bytes());
    let _ = writeln!(out, "# This file was generated by {GENERATOR_SIGNATURE}. DO NOT EDIT.");
    let _ = writeln!(out, "# Source: {source_path} (sha256:{digest:x})");
    out.push_str("#\n# To update, edit the source file and run: gh aw compile\n\n");

    let _ = writeln!(out, "name: {}", scalar(&plan.name));
    out.push('\n');

    emit_triggers(&mut out, plan)?;
    out.push('\n');

    out.push_str("concurrency:\n");
    let _ = writeln!(out, "  group: {}", scalar(&plan.concurrency_group));
    let _ = writeln!(out, "  cancel-in-progress: {}", plan.cancel_in_progress);
    out.push('\n');

    if !plan.env.is_empty() {
        out.push_str("env:\n");
        for (key, value) in &plan.env {
            let _ = writeln!(out, "  {key}: {}", scalar(value));
        }
        out.push('\n');
    }

    out.push_str("jobs:\n");
    for job in &plan.jobs {
        emit_job(&mut out, job)?;
    }

    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

fn emit_triggers(out: &mut String, plan: &WorkflowPlan) -> Result<()> {
    out.push_str("on:\n");
    let triggers = &plan.triggers;

    if !triggers.schedules.is_empty() {
        out.push_str("  schedule:\n");
        for schedule in &triggers.schedules {
            if schedule.phrase == schedule.cron {
                let _ = writeln!(out, "    - cron: {}", scalar(&schedule.cron));
            } else {
                let _ = writeln!(
                    out,
                    "    - cron: {} # {}",
                    scalar(&schedule.cron),
                    schedule.phrase
                );
            }
        }
    }

    for (event, config) in &triggers.events {
        match config {
            Value::Null => {
                let _ = writeln!(out, "  {event}: {{}}");
            },
            other => {
                let _ = writeln!(out, "  {event}:");
                emit_value(out, other, 1)?;
            },
        }
    }
    Ok(())
}

fn emit_job(out: &mut String, job: &Job) -> Result<()> {
    let _ = writeln!(out, "  {}:", job.key);

    if !job.needs.is_empty() {
        // `needs:` keeps declaration order; it is semantic.
        if job.needs.len() == 1 {
            let _ = writeln!(out, "    needs: {}", job.needs[0]);
        } else {
            out.push_str("    needs:\n");
            for need in &job.needs {
                let _ = writeln!(out, "      - {need}");
            }
        }
    }

    if let Some(ref condition) = job.if_cond {
        let _ = writeln!(out, "    if: {}", scalar(condition));
    }

    out.push_str("    runs-on: ");
    match &job.runs_on {
        Value::String(runner) => {
            let _ = writeln!(out, "{}", scalar(runner));
        },
        other => {
            out.push('\n');
            emit_value(out, other, 2)?;
        },
    }

    emit_permissions(out, &job.permissions);

    if let Some(timeout) = job.timeout_minutes {
        let _ = writeln!(out, "    timeout-minutes: {timeout}");
    }

    if !job.env.is_empty() {
        out.push_str("    env:\n");
        for (key, value) in &job.env {
            let _ = writeln!(out, "      {key}: {}", scalar(value));
        }
    }

    if !job.outputs.is_empty() {
        out.push_str("    outputs:\n");
        for (key, value) in &job.outputs {
            let _ = writeln!(out, "      {key}: {}", scalar(value));
        }
    }

    out.push_str("    steps:\n");
    for step in &job.steps {
        emit_step(out, step)?;
    }
    Ok(())
}

fn emit_permissions(out: &mut String, permissions: &[(String, String)]) {
    // A single entry with no level is the `read-all` / `write-all` shorthand.
    if let [(shorthand, level)] = permissions
        && level.is_empty()
    {
        let _ = writeln!(out, "    permissions: {shorthand}");
        return;
    }
    if permissions.is_empty() {
        out.push_str("    permissions: {}\n");
        return;
    }
    let mut sorted: Vec<&(String, String)> = permissions.iter().collect();
    sorted.sort();
    out.push_str("    permissions:\n");
    for (scope, level) in sorted {
        let _ = writeln!(out, "      {scope}: {level}");
    }
}

fn emit_step(out: &mut String, step: &Step) -> Result<()> {
    if let Some(ref raw) = step.raw {
        emit_raw_step(out, raw)?;
        return Ok(());
    }

    let mut first = true;
    let mut field = |out: &mut String, key: &str, value: &str| {
        let prefix = if first { "      - " } else { "        " };
        first = false;
        let _ = writeln!(out, "{prefix}{key}: {value}");
    };

    if let Some(ref name) = step.name {
        field(out, "name", &scalar(name));
    }
    if let Some(ref id) = step.id {
        field(out, "id", id);
    }
    if let Some(ref condition) = step.if_cond {
        field(out, "if", &scalar(condition));
    }
    if let Some(ref uses) = step.uses {
        field(out, "uses", uses);
    }
    if step.continue_on_error {
        field(out, "continue-on-error", "true");
    }
    if !step.with.is_empty() {
        let prefix = if first { "      - " } else { "        " };
        first = false;
        let _ = writeln!(out, "{prefix}with:");
        for (key, value) in &step.with {
            emit_block_or_scalar(out, key, value, "          ");
        }
    }
    if !step.env.is_empty() {
        let prefix = if first { "      - " } else { "        " };
        first = false;
        let _ = writeln!(out, "{prefix}env:");
        for (key, value) in &step.env {
            emit_block_or_scalar(out, key, value, "          ");
        }
    }
    if let Some(ref run) = step.run {
        let prefix = if first { "      - " } else { "        " };
        let _ = writeln!(out, "{prefix}run: |");
        for line in run.lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                let _ = writeln!(out, "          {line}");
            }
        }
    }
    Ok(())
}

/// Multi-line values become literal blocks; single-line values stay inline.
fn emit_block_or_scalar(out: &mut String, key: &str, value: &str, indent: &str) {
    if value.contains('\n') {
        let _ = writeln!(out, "{indent}{key}: |");
        for line in value.lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                let _ = writeln!(out, "{indent}  {line}");
            }
        }
    } else {
        let _ = writeln!(out, "{indent}{key}: {}", scalar(value));
    }
}

fn emit_raw_step(out: &mut String, raw: &Value) -> Result<()> {
    let Value::Mapping(mapping) = raw else {
        return Err(Error::Emission("user step must be a mapping".to_string()));
    };
    let mut first = true;
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            return Err(Error::Emission("user step keys must be strings".to_string()));
        };
        let prefix = if first { "      - " } else { "        " };
        first = false;
        match value {
            Value::Mapping(_) | Value::Sequence(_) => {
                let _ = writeln!(out, "{prefix}{key}:");
                emit_value(out, value, 4)?;
            },
            Value::String(s) if s.contains('\n') => {
                let _ = writeln!(out, "{prefix}{key}: |");
                for line in s.lines() {
                    if line.is_empty() {
                        out.push('\n');
                    } else {
                        let _ = writeln!(out, "          {line}");
                    }
                }
            },
            other => {
                let _ = writeln!(out, "{prefix}{key}: {}", scalar_value(other));
            },
        }
    }
    Ok(())
}

/// Emit a YAML value at `level` (two spaces per level), mappings in the
/// order they were authored.
fn emit_value(out: &mut String, value: &Value, level: usize) -> Result<()> {
    let indent = "  ".repeat(level);
    match value {
        Value::Mapping(mapping) => {
            for (key, child) in mapping {
                let Some(key) = key.as_str() else {
                    return Err(Error::Emission("mapping keys must be strings".to_string()));
                };
                match child {
                    Value::Mapping(m) if m.is_empty() => {
                        let _ = writeln!(out, "{indent}  {key}: {{}}");
                    },
                    Value::Mapping(_) | Value::Sequence(_) => {
                        let _ = writeln!(out, "{indent}  {key}:");
                        emit_value(out, child, level + 1)?;
                    },
                    other => {
                        let _ = writeln!(out, "{indent}  {key}: {}", scalar_value(other));
                    },
                }
            }
        },
        Value::Sequence(items) => {
            for item in items {
                match item {
                    Value::Mapping(_) => {
                        // Render the mapping inline after the dash.
                        let mut nested = String::new();
                        emit_value(&mut nested, item, 0)?;
                        let mut lines = nested.lines();
                        if let Some(first_line) = lines.next() {
                            let _ = writeln!(out, "{indent}  - {}", first_line.trim_start());
                            for line in lines {
                                // Nested lines carry a two-space base indent
                                // from the level-0 render; keep them aligned
                                // under the dash.
                                let _ = writeln!(out, "{indent}  {line}");
                            }
                        }
                    },
                    other => {
                        let _ = writeln!(out, "{indent}  - {}", scalar_value(other));
                    },
                }
            }
        },
        other => {
            let _ = writeln!(out, "{indent}  {}", scalar_value(other));
        },
    }
    Ok(())
}

fn scalar_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => scalar(s),
        _ => String::new(),
    }
}

/// Quote a string scalar unless it is unambiguously plain.
fn scalar(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-' | '.' | '/' | '@'))
        && !s.starts_with(['-', ' '])
        && !s.ends_with(' ')
        && s.parse::<f64>().is_err()
        && !matches!(s, "true" | "false" | "null" | "yes" | "no" | "on" | "off");
    if plain {
        s.to_string()
    } else {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            frontmatter::Frontmatter, jobs::{BuildInputs, build_jobs},
            safe_outputs::plan_safe_outputs, tools::resolve_tools,
            triggers::normalize_triggers,
        },
    };

    fn emit(frontmatter_yaml: &str) -> String {
        let value: Value = serde_yaml::from_str(frontmatter_yaml).unwrap();
        let frontmatter = Frontmatter::from_value(&value).unwrap();
        let (tools, _) = resolve_tools(&frontmatter).unwrap();
        let plan = plan_safe_outputs(frontmatter.safe_outputs.as_ref());
        let (triggers, _) = normalize_triggers(frontmatter.on.as_ref(), "wf/test.md");
        let workflow = build_jobs(&BuildInputs {
            spec_id: "test",
            frontmatter: &frontmatter,
            body: "Do the thing.\n",
            tools: &tools,
            plan: &plan,
            triggers: &triggers,
        })
        .unwrap();
        emit_workflow(&workflow, ".github/workflows/test.md", "source-bytes").unwrap()
    }

    #[test]
    fn header_identifies_source_and_hash() {
        let out = emit("on: push\n");
        let mut lines = out.lines();
        assert!(lines.next().unwrap().starts_with("# This file was generated by gh-aw"));
        let source_line = lines.next().unwrap();
        assert!(source_line.contains(".github/workflows/test.md"));
        assert!(source_line.contains("sha256:"));
    }

    #[test]
    fn trailing_newline_forced() {
        assert!(emit("on: push\n").ends_with('\n'));
    }

    #[test]
    fn schedule_carries_phrase_comment() {
        let out = emit("on: daily at 02:00\n");
        assert!(out.contains("- cron: \"0 2 * * *\" # daily at 02:00"));
        assert!(out.contains("workflow_dispatch: {}"));
    }

    #[test]
    fn raw_cron_has_no_comment() {
        let out = emit("on: \"0 9 * * 1\"\n");
        assert!(out.contains("- cron: \"0 9 * * 1\"\n"));
        assert!(!out.contains("# 0 9 * * 1"));
    }

    #[test]
    fn run_blocks_are_literal() {
        let out = emit("on: push\n");
        assert!(out.contains("run: |"));
    }

    #[test]
    fn emission_is_deterministic() {
        let yaml = "on: push\ntools:\n  github:\nsafe-outputs:\n  create-issue:\n  add-comment:\n";
        assert_eq!(emit(yaml), emit(yaml));
    }

    #[test]
    fn permissions_rendered_sorted() {
        let out = emit("on: push\npermissions:\n  issues: write\n  contents: read\n");
        let contents = out.find("contents: read").unwrap();
        let issues = out.find("issues: write").unwrap();
        assert!(contents < issues);
    }

    #[test]
    fn permissions_shorthand() {
        let out = emit("on: push\npermissions: read-all\n");
        assert!(out.contains("    permissions: read-all\n"));
    }

    #[test]
    fn event_config_preserved() {
        let out = emit("on:\n  issues:\n    types: [opened, labeled]\n");
        assert!(out.contains("  issues:\n"));
        assert!(out.contains("    types:\n"));
        assert!(out.contains("      - opened\n"));
        assert!(out.contains("      - labeled\n"));
    }

    #[test]
    fn user_steps_emitted_verbatim() {
        let out = emit("on: push\nsteps:\n  - name: Build\n    run: make build\n");
        assert!(out.contains("      - name: Build\n"));
        assert!(out.contains("        run: make build\n"));
    }

    #[test]
    fn scalar_quoting() {
        assert_eq!(scalar("plain-word"), "plain-word");
        assert_eq!(scalar("ubuntu-latest"), "ubuntu-latest");
        assert_eq!(scalar("0 2 * * *"), "\"0 2 * * *\"");
        assert_eq!(scalar("a: b"), "\"a: b\"");
        assert_eq!(scalar("true"), "\"true\"");
        assert_eq!(scalar("1.5"), "\"1.5\"");
        assert_eq!(scalar("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(
            scalar("${{ github.ref }}"),
            "\"${{ github.ref }}\""
        );
    }

    #[test]
    fn jobs_emitted_in_canonical_order() {
        let out = emit("on: /bot\nsafe-outputs:\n  create-issue:\n  add-comment:\n");
        let activation = out.find("  activation:").unwrap();
        let agent = out.find("  agent:").unwrap();
        let add_comment = out.find("  add_comment:").unwrap();
        let create_issue = out.find("  create_issue:").unwrap();
        assert!(activation < agent);
        assert!(agent < add_comment);
        assert!(add_comment < create_issue);
    }
}
