//! The per-file compilation pipeline, from effective frontmatter to lock
//! file content.
//!
//! The caller (the CLI driver) owns file IO and import resolution; this
//! module owns everything after: re-validation of the merged tree, rule
//! checks, planning, job building, and emission.

use {
    ghaw_common::{Diagnostic, FileReport},
    ghaw_parser::{SchemaKind, rules, split::SplitSpec, validate_frontmatter},
    serde_yaml::Value,
    tracing::debug,
};

use crate::{
    campaign,
    emit::emit_workflow,
    frontmatter::Frontmatter,
    jobs::{BuildInputs, build_jobs},
    safe_outputs::plan_safe_outputs,
    tools::resolve_tools,
    triggers::normalize_triggers,
};

/// The result of compiling one spec file.
#[derive(Debug)]
pub struct CompiledFile {
    /// Repo-relative path the lock file should be written to.
    pub lock_path: String,
    /// Emitted YAML; `None` when diagnostics contain errors.
    pub content: Option<String>,
    pub report: FileReport,
}

/// Spec id: file name minus the `.md` suffix (campaigns keep their
/// `.campaign` segment).
#[must_use]
pub fn spec_id(source_path: &str) -> String {
    let name = source_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source_path);
    name.strip_suffix(".md").unwrap_or(name).to_string()
}

/// Lock file path: `x.md` → `x.lock.yml`, `x.campaign.md` →
/// `x.campaign.lock.yml`.
#[must_use]
pub fn lock_path(source_path: &str) -> String {
    match source_path.strip_suffix(".md") {
        Some(stem) => format!("{stem}.lock.yml"),
        None => format!("{source_path}.lock.yml"),
    }
}

/// Compile one spec from its effective (post-import) frontmatter and body.
///
/// `source` is the original file text, hashed into the lock header.
/// `strict` forces strict-mode checks regardless of the frontmatter flag.
#[must_use]
pub fn compile_source(
    source_path: &str,
    source: &str,
    effective_frontmatter: &Value,
    body: &str,
    strict: bool,
) -> CompiledFile {
    let id = spec_id(source_path);
    let mut report = FileReport::new(source_path);
    debug!(spec = %id, "compiling");

    // Post-merge validation has no useful source coordinates; diagnostics
    // land without line numbers.
    let no_location = SplitSpec {
        frontmatter: String::new(),
        body: String::new(),
        frontmatter_start_line: 0,
        body_start_line: 0,
    };

    let frontmatter_value = apply_strict(effective_frontmatter, strict);
    report.extend(validate_frontmatter(
        &frontmatter_value,
        SchemaKind::Main,
        &no_location,
    ));
    report.extend(rules::check_rules(&frontmatter_value, body, &no_location));

    let frontmatter = match Frontmatter::from_value(&frontmatter_value) {
        Ok(frontmatter) => frontmatter,
        Err(e) => {
            report.push(Diagnostic::error("schema", "", e.to_string()));
            return CompiledFile {
                lock_path: lock_path(source_path),
                content: None,
                report,
            };
        },
    };

    let workflow = if campaign::is_campaign(source_path) {
        campaign::build_campaign(&id, source_path, &frontmatter).map(|(workflow, diags)| {
            report.extend(diags);
            workflow
        })
    } else {
        build_normal(&id, source_path, &frontmatter, body, &mut report)
    };

    let content = match workflow {
        Ok(workflow) if !report.has_errors() => {
            match emit_workflow(&workflow, source_path, source) {
                Ok(content) => Some(content),
                Err(e) => {
                    report.push(Diagnostic::error("emission", "", e.to_string()));
                    None
                },
            }
        },
        Ok(_) => None,
        Err(e) => {
            report.push(Diagnostic::error("schema", "", e.to_string()));
            None
        },
    };

    report.sort_by_line();
    CompiledFile {
        lock_path: lock_path(source_path),
        content,
        report,
    }
}

fn build_normal(
    id: &str,
    source_path: &str,
    frontmatter: &Frontmatter,
    body: &str,
    report: &mut FileReport,
) -> crate::error::Result<crate::jobs::WorkflowPlan> {
    let (tools, tool_diags) = resolve_tools(frontmatter)?;
    report.extend(tool_diags);
    let plan = plan_safe_outputs(frontmatter.safe_outputs.as_ref());
    let (triggers, trigger_diags) = normalize_triggers(frontmatter.on.as_ref(), source_path);
    report.extend(trigger_diags);

    build_jobs(&BuildInputs {
        spec_id: id,
        frontmatter,
        body,
        tools: &tools,
        plan: &plan,
        triggers: &triggers,
    })
}

/// `--strict` behaves exactly as `strict: true` in every file.
fn apply_strict(frontmatter: &Value, strict: bool) -> Value {
    if !strict {
        return frontmatter.clone();
    }
    let mut value = frontmatter.clone();
    if let Value::Mapping(ref mut mapping) = value {
        mapping.insert(Value::String("strict".to_string()), Value::Bool(true));
    }
    value
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn compile(frontmatter_yaml: &str, body: &str) -> CompiledFile {
        let value: Value = serde_yaml::from_str(frontmatter_yaml).unwrap();
        compile_source(".github/workflows/test.md", "raw source", &value, body, false)
    }

    #[test]
    fn paths() {
        assert_eq!(spec_id(".github/workflows/ci-doctor.md"), "ci-doctor");
        assert_eq!(spec_id("a/b.campaign.md"), "b.campaign");
        assert_eq!(
            lock_path(".github/workflows/ci-doctor.md"),
            ".github/workflows/ci-doctor.lock.yml"
        );
        assert_eq!(lock_path("x.campaign.md"), "x.campaign.lock.yml");
    }

    #[test]
    fn scenario_daily_copilot_add_comment() {
        let compiled = compile(
            "on: daily at 02:00\nengine: copilot\nsafe-outputs:\n  add-comment:\ntools:\n  github:\n",
            "Summarize activity.\n",
        );
        assert!(!compiled.report.has_errors(), "{:?}", compiled.report);
        let content = compiled.content.unwrap();
        assert!(content.contains("- cron: \"0 2 * * *\" # daily at 02:00"));
        assert!(content.contains("workflow_dispatch: {}"));
        assert!(content.contains("  agent:"));
        assert!(content.contains("  add_comment:"));
        assert!(content.contains("    needs: agent"));
        assert!(content.contains("@github/copilot@"));
        assert!(content.contains("\\\"type\\\": \\\"stdio\\\"") || content.contains("\"type\": \"stdio\""));
        assert!(content.contains("safeoutputs"));
    }

    #[test]
    fn compile_is_deterministic() {
        let a = compile("on: daily\nsafe-outputs:\n  create-issue:\n", "body\n");
        let b = compile("on: daily\nsafe-outputs:\n  create-issue:\n", "body\n");
        assert_eq!(a.content.unwrap(), b.content.unwrap());
    }

    #[test]
    fn errors_suppress_output() {
        let compiled = compile("engine: not-an-engine\n", "");
        assert!(compiled.report.has_errors());
        assert!(compiled.content.is_none());
    }

    #[test]
    fn multiple_violations_reported_together() {
        let compiled = compile(
            "engine: not-an-engine\nbogus-key: 1\nsafe-outputs:\n  create-isue:\n",
            "",
        );
        let errors: Vec<_> = compiled
            .report
            .diagnostics
            .iter()
            .filter(|d| d.severity == ghaw_common::Severity::Error)
            .collect();
        assert!(errors.len() >= 3, "{errors:?}");
    }

    #[test]
    fn strict_flag_applies_strict_rules() {
        let lax = compile("on: push\npermissions:\n  contents: write\n", "");
        assert!(!lax.report.has_errors());

        let value: Value =
            serde_yaml::from_str("on: push\npermissions:\n  contents: write\n").unwrap();
        let strict = compile_source(".github/workflows/t.md", "src", &value, "", true);
        assert!(strict.report.has_errors());
    }

    #[test]
    fn campaign_lock_suffix_and_orchestrator() {
        let value: Value = serde_yaml::from_str("tracker-id: BB-1\n").unwrap();
        let compiled = compile_source(
            ".github/workflows/burndown.campaign.md",
            "src",
            &value,
            "Documentation only.\n",
            false,
        );
        assert_eq!(
            compiled.lock_path,
            ".github/workflows/burndown.campaign.lock.yml"
        );
        let content = compiled.content.unwrap();
        assert!(content.contains("Discover campaign items"));
        // The documentation body is not the prompt.
        assert!(!content.contains("Documentation only."));
    }

    #[test]
    fn empty_tools_no_mcp_block() {
        let compiled = compile("on: push\n", "body\n");
        let content = compiled.content.unwrap();
        assert!(!content.contains("Render MCP configuration"));
    }
}
