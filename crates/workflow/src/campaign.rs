//! Campaign orchestrator generation.
//!
//! `*.campaign.md` specs describe a multi-run initiative. Their Markdown
//! body is documentation; the compiler synthesizes a scheduled coordination
//! workflow instead: discover candidate items via the GitHub Search API,
//! write a manifest, and let the agent coordinate follow-up through a
//! restricted safe-output set.

use std::collections::BTreeMap;

use {ghaw_common::Diagnostic, serde_yaml::Value};

use crate::{
    error::Result,
    frontmatter::Frontmatter,
    jobs::{BuildInputs, Step, WorkflowPlan, build_jobs},
    safe_outputs::plan_safe_outputs,
    tools::resolve_tools,
    triggers::normalize_triggers,
};

/// Safe-output types a campaign orchestrator may use.
const CAMPAIGN_SAFE_OUTPUTS: &[&str] = &["add-comment", "dispatch-workflow", "update-project"];
/// Tools a campaign orchestrator may use.
const CAMPAIGN_TOOLS: &[&str] = &["cache-memory", "github"];

/// Whether a source path is a campaign spec.
#[must_use]
pub fn is_campaign(source_path: &str) -> bool {
    source_path.ends_with(".campaign.md")
}

/// Campaign id from the spec id ("backlog-burndown.campaign" →
/// "backlog-burndown").
#[must_use]
pub fn campaign_id(spec_id: &str) -> &str {
    spec_id.strip_suffix(".campaign").unwrap_or(spec_id)
}

/// Build the orchestrator plan for a campaign spec.
pub fn build_campaign(
    spec_id: &str,
    source_path: &str,
    frontmatter: &Frontmatter,
) -> Result<(WorkflowPlan, Vec<Diagnostic>)> {
    let id = campaign_id(spec_id);
    let mut diagnostics = Vec::new();
    let mut frontmatter = frontmatter.clone();

    // Campaigns run on a schedule; default to a scattered daily slot.
    if frontmatter.on.is_none() {
        frontmatter.on = Some(Value::String("daily".to_string()));
    }

    restrict(
        &mut frontmatter,
        &mut diagnostics,
        CAMPAIGN_TOOLS,
        CAMPAIGN_SAFE_OUTPUTS,
    );

    // Rate limits ride on the workflow env so every conclusion job sees them.
    if let Some(ref governance) = frontmatter.governance {
        if let Some(limit) = governance.max_runs_per_hour {
            frontmatter
                .env
                .insert("GH_AW_MAX_RUNS_PER_HOUR".to_string(), limit.to_string());
        }
        if let Some(limit) = governance.max_comments_per_run {
            frontmatter
                .env
                .insert("GH_AW_MAX_COMMENTS_PER_RUN".to_string(), limit.to_string());
        }
        if let Some(limit) = governance.max_dispatches_per_run {
            frontmatter
                .env
                .insert("GH_AW_MAX_DISPATCHES_PER_RUN".to_string(), limit.to_string());
        }
    }

    let (tools, tool_diags) = resolve_tools(&frontmatter)?;
    diagnostics.extend(tool_diags);
    let plan = plan_safe_outputs(frontmatter.safe_outputs.as_ref());
    let (triggers, trigger_diags) = normalize_triggers(frontmatter.on.as_ref(), source_path);
    diagnostics.extend(trigger_diags);

    let body = orchestrator_prompt(id, &frontmatter);
    let mut workflow = build_jobs(&BuildInputs {
        spec_id,
        frontmatter: &frontmatter,
        body: &body,
        tools: &tools,
        plan: &plan,
        triggers: &triggers,
    })?;

    insert_discovery_step(&mut workflow, id, &frontmatter);
    Ok((workflow, diagnostics))
}

/// Drop tools and safe-output types outside the campaign allowlists.
fn restrict(
    frontmatter: &mut Frontmatter,
    diagnostics: &mut Vec<Diagnostic>,
    allowed_tools: &[&str],
    allowed_outputs: &[&str],
) {
    let dropped_tools: Vec<String> = frontmatter
        .tools
        .keys()
        .filter(|name| !allowed_tools.contains(&name.as_str()))
        .cloned()
        .collect();
    for name in dropped_tools {
        frontmatter.tools.remove(&name);
        diagnostics.push(Diagnostic::warning(
            "rule",
            format!("tools.{name}"),
            "campaign orchestrators run with a restricted tool set; entry dropped",
        ));
    }
    for tool in allowed_tools {
        frontmatter
            .tools
            .entry((*tool).to_string())
            .or_insert(Value::Null);
    }

    if let Some(Value::Mapping(ref mut outputs)) = frontmatter.safe_outputs {
        let dropped: Vec<Value> = outputs
            .keys()
            .filter(|key| {
                key.as_str().is_some_and(|name| {
                    !allowed_outputs.contains(&name)
                        && !matches!(name, "staged" | "threat-detection" | "max-patch-size" | "messages")
                })
            })
            .cloned()
            .collect();
        for key in dropped {
            if let Some(name) = key.as_str() {
                diagnostics.push(Diagnostic::warning(
                    "rule",
                    format!("safe-outputs.{name}"),
                    "campaigns may only use update-project, add-comment, and dispatch-workflow; entry dropped",
                ));
            }
            outputs.remove(&key);
        }
    }
}

/// The coordination prompt the orchestrator agent receives.
fn orchestrator_prompt(campaign_id: &str, frontmatter: &Frontmatter) -> String {
    let mut prompt = format!(
        "# Campaign coordination: {campaign_id}\n\n\
         A discovery step has written the current candidate manifest to\n\
         `/tmp/gh-aw/campaign/manifest.json` and the persisted cursor to\n\
         `/tmp/gh-aw/cache-memory/campaigns/{campaign_id}/cursor.json`.\n\n\
         Review the manifest, decide which items need attention this run,\n\
         and record your decisions through the safe-output tools. Respect\n\
         the configured rate limits; leave items you cannot finish for the\n\
         next run by updating the cursor.\n"
    );
    if let Some(ref project) = frontmatter.project {
        prompt.push_str(&format!(
            "\nTrack overall progress on the project board `{project}`.\n"
        ));
    }
    prompt
}

/// Discovery runs after directory preparation and before the collector
/// starts, so the manifest exists when the agent boots.
fn insert_discovery_step(workflow: &mut WorkflowPlan, campaign_id: &str, frontmatter: &Frontmatter) {
    let Some(agent) = workflow.jobs.iter_mut().find(|j| j.key == "agent") else {
        return;
    };

    let mut env = BTreeMap::from([(
        "GH_AW_CAMPAIGN_ID".to_string(),
        campaign_id.to_string(),
    )]);
    if let Some(ref tracker) = frontmatter.tracker_id {
        env.insert("GH_AW_TRACKER_ID".to_string(), tracker.clone());
    }

    let mut discovery = Step {
        name: Some("Discover campaign items".to_string()),
        id: Some("discovery".to_string()),
        uses: Some("actions/github-script@v8".to_string()),
        with: BTreeMap::from([("script".to_string(), DISCOVERY_SCRIPT.to_string())]),
        ..Step::default()
    };
    discovery.env = env;

    let position = agent
        .steps
        .iter()
        .position(|s| s.name.as_deref() == Some("Start safe-outputs collector"))
        .or_else(|| {
            agent
                .steps
                .iter()
                .position(|s| s.name.as_deref() == Some("Write agent prompt"))
        })
        .unwrap_or(agent.steps.len());
    agent.steps.insert(position, discovery);
}

const DISCOVERY_SCRIPT: &str = r"const fs = require('fs');
const campaignId = process.env.GH_AW_CAMPAIGN_ID;
const trackerId = process.env.GH_AW_TRACKER_ID;
const cursorDir = `/tmp/gh-aw/cache-memory/campaigns/${campaignId}`;
const cursorPath = `${cursorDir}/cursor.json`;
fs.mkdirSync(cursorDir, { recursive: true });
fs.mkdirSync('/tmp/gh-aw/campaign', { recursive: true });
let cursor = {};
if (fs.existsSync(cursorPath)) {
  cursor = JSON.parse(fs.readFileSync(cursorPath, 'utf8'));
}
const terms = [`repo:${context.repo.owner}/${context.repo.repo}`];
if (trackerId) terms.push(`${trackerId} in:body`);
terms.push(`label:campaign:${campaignId}`);
const result = await github.rest.search.issuesAndPullRequests({
  q: terms.join(' '), per_page: 100,
});
const manifest = {
  campaign: campaignId,
  discovered_at: new Date().toISOString(),
  cursor,
  items: result.data.items.map((item) => ({
    number: item.number,
    title: item.title,
    state: item.state,
    url: item.html_url,
  })),
};
fs.writeFileSync('/tmp/gh-aw/campaign/manifest.json', JSON.stringify(manifest, null, 2));
cursor.last_run = manifest.discovered_at;
fs.writeFileSync(cursorPath, JSON.stringify(cursor, null, 2));
core.info(`discovered ${manifest.items.length} candidate item(s)`);";

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn build(yaml: &str) -> (WorkflowPlan, Vec<Diagnostic>) {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let frontmatter = Frontmatter::from_value(&value).unwrap();
        build_campaign(
            "backlog-burndown.campaign",
            ".github/workflows/backlog-burndown.campaign.md",
            &frontmatter,
        )
        .unwrap()
    }

    #[test]
    fn path_detection() {
        assert!(is_campaign(".github/workflows/x.campaign.md"));
        assert!(!is_campaign(".github/workflows/x.md"));
        assert_eq!(campaign_id("x.campaign"), "x");
    }

    #[test]
    fn defaults_to_scheduled() {
        let (workflow, _) = build("tracker-id: BB-1\n");
        assert!(!workflow.triggers.schedules.is_empty());
    }

    #[test]
    fn discovery_step_before_agent() {
        let (workflow, _) = build("tracker-id: BB-1\nsafe-outputs:\n  add-comment:\n");
        let agent = workflow.jobs.iter().find(|j| j.key == "agent").unwrap();
        let discovery = agent
            .steps
            .iter()
            .position(|s| s.id.as_deref() == Some("discovery"))
            .unwrap();
        let invoke = agent
            .steps
            .iter()
            .position(|s| s.id.as_deref() == Some("agent"))
            .unwrap();
        assert!(discovery < invoke);
        assert_eq!(
            agent.steps[discovery].env["GH_AW_TRACKER_ID"],
            "BB-1"
        );
    }

    #[test]
    fn disallowed_outputs_dropped_with_warning() {
        let (workflow, diags) = build("safe-outputs:\n  create-issue:\n  add-comment:\n");
        assert!(workflow.jobs.iter().all(|j| j.key != "create_issue"));
        assert!(workflow.jobs.iter().any(|j| j.key == "add_comment"));
        assert!(diags.iter().any(|d| d.path == "safe-outputs.create-issue"));
    }

    #[test]
    fn disallowed_tools_dropped() {
        let (workflow, diags) = build("tools:\n  playwright:\n");
        assert!(diags.iter().any(|d| d.path == "tools.playwright"));
        let agent = workflow.jobs.iter().find(|j| j.key == "agent").unwrap();
        // github and cache-memory are forced in; playwright is not.
        let config_step = agent
            .steps
            .iter()
            .find(|s| s.name.as_deref() == Some("Render MCP configuration"))
            .unwrap();
        assert!(!config_step.run.as_deref().unwrap().contains("playwright"));
    }

    #[test]
    fn governance_limits_on_workflow_env() {
        let (workflow, _) = build("governance:\n  max-runs-per-hour: 3\n  max-comments-per-run: 5\n");
        assert_eq!(workflow.env["GH_AW_MAX_RUNS_PER_HOUR"], "3");
        assert_eq!(workflow.env["GH_AW_MAX_COMMENTS_PER_RUN"], "5");
    }

    #[test]
    fn memory_paths_derived_from_campaign_id() {
        let (workflow, _) = build("{}");
        let agent = workflow.jobs.iter().find(|j| j.key == "agent").unwrap();
        let discovery = agent
            .steps
            .iter()
            .find(|s| s.id.as_deref() == Some("discovery"))
            .unwrap();
        assert_eq!(discovery.env["GH_AW_CAMPAIGN_ID"], "backlog-burndown");
        assert!(
            discovery.with["script"].contains("campaigns/${campaignId}"),
        );
    }
}
