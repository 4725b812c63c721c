//! Safe-output planning.
//!
//! `safe-outputs:` grants the agent a fixed menu of write capabilities.
//! The agent itself never performs a write: it records requests through the
//! synthesized `safeoutputs` MCP server, and one conclusion job per enabled
//! type replays validated requests under least-privilege permissions after
//! the agent job finishes.

use serde_yaml::Value;

/// Default cap on generated patch size (KB) for branch-push outputs.
pub const DEFAULT_MAX_PATCH_SIZE: u64 = 1024;

/// Entries under `safe-outputs:` that configure the plan rather than
/// enabling a conclusion job.
const CONFIG_KEYS: &[&str] = &["max-patch-size", "messages", "staged", "threat-detection"];

/// One enabled output type.
#[derive(Debug, Clone)]
pub struct OutputType {
    /// Frontmatter name ("create-issue").
    pub name: String,
    /// Options mapping as written (`Null` when enabled with defaults).
    pub options: Value,
}

impl OutputType {
    /// Job identifier for this type ("create_issue").
    #[must_use]
    pub fn job_name(&self) -> String {
        self.name.replace('-', "_")
    }

    /// Per-type request cap, when configured.
    #[must_use]
    pub fn max(&self) -> Option<u64> {
        self.options.get("max").and_then(Value::as_u64)
    }

    /// The `if-no-changes` handling mode (warn when unset).
    #[must_use]
    pub fn if_no_changes(&self) -> &str {
        self.options
            .get("if-no-changes")
            .and_then(Value::as_str)
            .unwrap_or("warn")
    }

    /// Minimal job permissions for this output type.
    #[must_use]
    pub fn permissions(&self) -> &'static [(&'static str, &'static str)] {
        match self.name.as_str() {
            "create-issue" | "update-issue" => &[("issues", "write")],
            "add-comment" => &[("issues", "write"), ("pull-requests", "write")],
            "add-labels" => &[("issues", "write"), ("pull-requests", "write")],
            "assign-to-agent" => &[("actions", "write"), ("issues", "write")],
            "create-discussion" | "close-discussion" => &[("discussions", "write")],
            "create-pull-request" => &[("contents", "write"), ("pull-requests", "write")],
            "create-pull-request-review-comment" | "update-pull-request" => {
                &[("pull-requests", "write")]
            },
            "push-to-pull-request-branch" => &[("contents", "write")],
            "update-release" | "upload-asset" => &[("contents", "write")],
            "create-project-status-update" | "update-project" | "copy-project" => {
                &[("repository-projects", "write")]
            },
            "dispatch-workflow" => &[("actions", "write")],
            _ => &[("contents", "read")],
        }
    }
}

/// The full safe-output plan for one workflow.
#[derive(Debug, Clone, Default)]
pub struct SafeOutputsPlan {
    /// Enabled types in frontmatter order.
    pub outputs: Vec<OutputType>,
    /// Dry-run mode: conclusion jobs preview instead of calling the API.
    pub staged: bool,
    /// Threat-detection gate config (`Some` when enabled).
    pub threat_detection: Option<Value>,
    pub max_patch_size: u64,
}

impl SafeOutputsPlan {
    /// Whether the agent gets the `safeoutputs` MCP server at all.
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.outputs.is_empty()
    }

    #[must_use]
    pub fn output(&self, name: &str) -> Option<&OutputType> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// Build the plan from the frontmatter `safe-outputs:` value.
#[must_use]
pub fn plan_safe_outputs(safe_outputs: Option<&Value>) -> SafeOutputsPlan {
    let mut plan = SafeOutputsPlan {
        max_patch_size: DEFAULT_MAX_PATCH_SIZE,
        ..SafeOutputsPlan::default()
    };
    let Some(mapping) = safe_outputs.and_then(Value::as_mapping) else {
        return plan;
    };

    for (key, config) in mapping {
        let Some(name) = key.as_str() else { continue };
        match name {
            "staged" => plan.staged = config.as_bool().unwrap_or(false),
            "max-patch-size" => {
                plan.max_patch_size = config.as_u64().unwrap_or(DEFAULT_MAX_PATCH_SIZE);
            },
            "threat-detection" => {
                // `threat-detection: false` disables it explicitly.
                if config.as_bool() != Some(false) {
                    plan.threat_detection = Some(config.clone());
                }
            },
            "messages" => {},
            _ => plan.outputs.push(OutputType {
                name: name.to_string(),
                options: config.clone(),
            }),
        }
    }
    plan
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn plan(yaml: &str) -> SafeOutputsPlan {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        plan_safe_outputs(Some(&value))
    }

    #[test]
    fn absent_config_plans_nothing() {
        let plan = plan_safe_outputs(None);
        assert!(!plan.enabled());
        assert_eq!(plan.max_patch_size, DEFAULT_MAX_PATCH_SIZE);
    }

    #[test]
    fn one_job_per_enabled_type() {
        let plan = plan("create-issue:\nadd-comment:\n  max: 3\n");
        assert_eq!(plan.outputs.len(), 2);
        assert_eq!(plan.outputs[0].name, "create-issue");
        assert_eq!(plan.outputs[0].job_name(), "create_issue");
        assert_eq!(plan.outputs[1].max(), Some(3));
    }

    #[test]
    fn config_keys_do_not_become_jobs() {
        let plan = plan("staged: true\nmax-patch-size: 512\ncreate-issue:\n");
        assert!(plan.staged);
        assert_eq!(plan.max_patch_size, 512);
        assert_eq!(plan.outputs.len(), 1);
        for key in CONFIG_KEYS {
            assert!(plan.output(key).is_none());
        }
    }

    #[test]
    fn threat_detection_config_captured() {
        let plan1 = plan("threat-detection:\n  steps:\n    - run: scan\ncreate-issue:\n");
        assert!(plan1.threat_detection.is_some());

        let plan2 = plan("threat-detection: false\ncreate-issue:\n");
        assert!(plan2.threat_detection.is_none());
    }

    #[test]
    fn permissions_least_privilege() {
        let plan = plan("create-issue:\npush-to-pull-request-branch:\n");
        assert_eq!(
            plan.output("create-issue").unwrap().permissions(),
            &[("issues", "write")]
        );
        assert_eq!(
            plan.output("push-to-pull-request-branch").unwrap().permissions(),
            &[("contents", "write")]
        );
    }

    #[test]
    fn if_no_changes_default_warn() {
        let plan1 = plan("push-to-pull-request-branch:\n");
        assert_eq!(
            plan1.output("push-to-pull-request-branch").unwrap().if_no_changes(),
            "warn"
        );
        let plan2 = plan("push-to-pull-request-branch:\n  if-no-changes: ignore\n");
        assert_eq!(
            plan2.output("push-to-pull-request-branch").unwrap().if_no_changes(),
            "ignore"
        );
    }
}
