//! Job graph construction.
//!
//! Canonical shape: an optional `activation` job evaluating trigger
//! conditions, the `agent` job running the engine, an optional
//! `threat_detection` gate, and one conclusion job per enabled safe-output
//! type. Secrets only ever appear in `env:`/`with:` blocks, never inside
//! `run:` bodies.

use std::collections::BTreeMap;

use {serde_yaml::Value, tracing::debug};

use crate::{
    engine::{EngineKind, PROMPT_PATH},
    error::Result,
    frontmatter::{Frontmatter, Permissions},
    js, network,
    safe_outputs::SafeOutputsPlan,
    tools::ToolSet,
    triggers::Triggers,
};

use ghaw_mcp::{
    GITHUB_TOKEN_CASCADE, NamedServer, SAFE_OUTPUTS_SERVER_NAME, hide_expressions, render_config,
    safe_outputs_server,
};

/// Path of the safe-output manifest the agent writes through the collector.
pub const SAFE_OUTPUTS_MANIFEST: &str = "/tmp/gh-aw/safe-outputs/outputs.jsonl";

/// One workflow step.
#[derive(Debug, Clone, Default)]
pub struct Step {
    pub name: Option<String>,
    pub id: Option<String>,
    pub uses: Option<String>,
    pub run: Option<String>,
    pub if_cond: Option<String>,
    pub with: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub continue_on_error: bool,
    /// A user-authored step carried verbatim from frontmatter `steps:`.
    pub raw: Option<Value>,
}

impl Step {
    fn github_script(name: &str, id: Option<&str>, script: String) -> Self {
        Self {
            name: Some(name.to_string()),
            id: id.map(str::to_string),
            uses: Some("actions/github-script@v8".to_string()),
            with: BTreeMap::from([("script".to_string(), script)]),
            ..Self::default()
        }
    }
}

/// One workflow job.
#[derive(Debug, Clone)]
pub struct Job {
    pub key: String,
    pub needs: Vec<String>,
    pub runs_on: Value,
    /// Scope → level pairs; emitted sorted. Empty means `permissions: {}`.
    pub permissions: Vec<(String, String)>,
    pub if_cond: Option<String>,
    pub env: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    pub timeout_minutes: Option<u64>,
    pub steps: Vec<Step>,
}

impl Job {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            needs: Vec::new(),
            runs_on: Value::String("ubuntu-latest".to_string()),
            permissions: Vec::new(),
            if_cond: None,
            env: BTreeMap::new(),
            outputs: BTreeMap::new(),
            timeout_minutes: None,
            steps: Vec::new(),
        }
    }
}

/// The fully planned workflow, ready for serialization.
#[derive(Debug, Clone)]
pub struct WorkflowPlan {
    pub name: String,
    pub triggers: Triggers,
    pub concurrency_group: String,
    pub cancel_in_progress: bool,
    pub env: BTreeMap<String, String>,
    /// Jobs in emission order: activation, agent, threat_detection, then
    /// conclusion jobs sorted by key.
    pub jobs: Vec<Job>,
}

/// Everything the builder needs for one spec.
pub struct BuildInputs<'a> {
    pub spec_id: &'a str,
    pub frontmatter: &'a Frontmatter,
    /// Import-expanded Markdown prompt.
    pub body: &'a str,
    pub tools: &'a ToolSet,
    pub plan: &'a SafeOutputsPlan,
    pub triggers: &'a Triggers,
}

/// Build the job graph.
pub fn build_jobs(inputs: &BuildInputs<'_>) -> Result<WorkflowPlan> {
    let name = inputs
        .frontmatter
        .display_name(inputs.spec_id)
        .to_string();
    debug!(workflow = %name, "building job graph");

    let mut jobs = Vec::new();
    if inputs.triggers.needs_activation() {
        jobs.push(activation_job(inputs));
    }
    jobs.push(agent_job(inputs, &name)?);
    if inputs.plan.threat_detection.is_some() && inputs.plan.enabled() {
        jobs.push(threat_detection_job(inputs)?);
    }
    let mut conclusions: Vec<Job> = inputs
        .plan
        .outputs
        .iter()
        .map(|output| conclusion_job(inputs, output))
        .collect::<Result<_>>()?;
    conclusions.sort_by(|a, b| a.key.cmp(&b.key));
    jobs.extend(conclusions);

    let (concurrency_group, cancel_in_progress) = concurrency(inputs);
    Ok(WorkflowPlan {
        name,
        triggers: inputs.triggers.clone(),
        concurrency_group,
        cancel_in_progress,
        env: inputs.frontmatter.env.clone(),
        jobs,
    })
}

fn concurrency(inputs: &BuildInputs<'_>) -> (String, bool) {
    match inputs.frontmatter.concurrency.as_ref() {
        Some(Value::String(group)) => (group.clone(), false),
        Some(Value::Mapping(mapping)) => {
            let group = mapping
                .get("group")
                .and_then(Value::as_str)
                .unwrap_or("gh-aw-${{ github.workflow }}-${{ github.ref }}")
                .to_string();
            let cancel = mapping
                .get("cancel-in-progress")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            (group, cancel)
        },
        _ => (
            "gh-aw-${{ github.workflow }}-${{ github.ref }}".to_string(),
            false,
        ),
    }
}

// ── activation ──────────────────────────────────────────────────────────────

fn activation_job(inputs: &BuildInputs<'_>) -> Job {
    let triggers = inputs.triggers;
    let mut job = Job::new("activation");
    job.permissions = vec![("contents".to_string(), "read".to_string())];
    job.outputs.insert(
        "activated".to_string(),
        "${{ steps.check.outputs.activated }}".to_string(),
    );

    let mut env = BTreeMap::new();
    if let Some(ref command) = triggers.command {
        env.insert("GH_AW_COMMAND".to_string(), format!("/{command}"));
    }
    if let Some(ref stop_after) = triggers.stop_after {
        env.insert("GH_AW_STOP_AFTER".to_string(), stop_after.clone());
    }
    if let Some(ref query) = triggers.skip_if_match {
        env.insert("GH_AW_SKIP_IF_MATCH".to_string(), query.clone());
    }

    let mut check = Step::github_script("Evaluate trigger conditions", Some("check"), ACTIVATION_SCRIPT.to_string());
    check.env = env;
    job.steps.push(check);

    if let Some(ref reaction) = triggers.reaction {
        job.permissions = vec![
            ("contents".to_string(), "read".to_string()),
            ("issues".to_string(), "write".to_string()),
            ("pull-requests".to_string(), "write".to_string()),
        ];
        let mut react = Step::github_script("React to trigger", None, REACTION_SCRIPT.to_string());
        react.env = BTreeMap::from([("GH_AW_REACTION".to_string(), reaction.clone())]);
        react.if_cond = Some("steps.check.outputs.activated == 'true'".to_string());
        job.steps.push(react);
    }
    job
}

/// Inline activation check; small enough to live here rather than in the
/// bundled asset set.
const ACTIVATION_SCRIPT: &str = r"const command = process.env.GH_AW_COMMAND;
const stopAfter = process.env.GH_AW_STOP_AFTER;
const skipQuery = process.env.GH_AW_SKIP_IF_MATCH;
let activated = true;
if (command) {
  const body = (context.payload.comment && context.payload.comment.body) ||
    (context.payload.issue && context.payload.issue.body) || '';
  activated = body.includes(command) || context.eventName === 'workflow_dispatch';
}
if (activated && stopAfter && Date.now() > Date.parse(stopAfter)) {
  core.notice(`workflow stop-after date ${stopAfter} has passed`);
  activated = false;
}
if (activated && skipQuery) {
  const result = await github.rest.search.issuesAndPullRequests({ q: skipQuery, per_page: 1 });
  if (result.data.total_count > 0) {
    core.notice(`skip-if-match query matched ${result.data.total_count} item(s)`);
    activated = false;
  }
}
core.setOutput('activated', String(activated));";

const REACTION_SCRIPT: &str = r"const reaction = process.env.GH_AW_REACTION || 'eyes';
const { owner, repo } = context.repo;
if (context.payload.comment) {
  await github.rest.reactions.createForIssueComment({
    owner, repo, comment_id: context.payload.comment.id, content: reaction,
  });
} else if (context.payload.issue) {
  await github.rest.reactions.createForIssue({
    owner, repo, issue_number: context.payload.issue.number, content: reaction,
  });
}";

// ── agent ───────────────────────────────────────────────────────────────────

fn agent_job(inputs: &BuildInputs<'_>, workflow_name: &str) -> Result<Job> {
    let engine_spec = inputs.frontmatter.engine();
    let engine = EngineKind::from_id(engine_spec.id())?;

    let mut job = Job::new("agent");
    job.timeout_minutes = Some(inputs.frontmatter.timeout_minutes());
    if let Some(ref runs_on) = inputs.frontmatter.runs_on {
        job.runs_on = runs_on.clone();
    }
    job.permissions = agent_permissions(inputs.frontmatter);
    if inputs.triggers.needs_activation() {
        job.needs.push("activation".to_string());
        job.if_cond = Some("needs.activation.outputs.activated == 'true'".to_string());
    }

    // a. Checkout. Branch-push outputs need full history for rebasing.
    let fetch_depth = if inputs.plan.output("push-to-pull-request-branch").is_some() {
        "0"
    } else {
        "1"
    };
    job.steps.push(Step {
        name: Some("Checkout repository".to_string()),
        uses: Some("actions/checkout@v5".to_string()),
        with: BTreeMap::from([
            ("fetch-depth".to_string(), fetch_depth.to_string()),
            ("persist-credentials".to_string(), "false".to_string()),
        ]),
        ..Step::default()
    });

    // b. Branch preparation for PR triggers.
    if inputs.triggers.events.contains_key("pull_request")
        || inputs.plan.output("push-to-pull-request-branch").is_some()
    {
        job.steps.push(Step {
            name: Some("Prepare pull request branch".to_string()),
            run: Some(
                "if [ -n \"$GH_AW_PR_BRANCH\" ]; then\n  git fetch origin \"$GH_AW_PR_BRANCH\"\n  git checkout \"$GH_AW_PR_BRANCH\"\nfi"
                    .to_string(),
            ),
            env: BTreeMap::from([(
                "GH_AW_PR_BRANCH".to_string(),
                "${{ github.event.pull_request.head.ref }}".to_string(),
            )]),
            ..Step::default()
        });
    }

    // c. Engine runtime.
    job.steps
        .extend(engine.install_steps(engine_version(&engine_spec)));

    // User-supplied steps run after the runtime is in place.
    for raw in &inputs.frontmatter.steps {
        job.steps.push(Step {
            raw: Some(raw.clone()),
            ..Step::default()
        });
    }

    // d. Working directories and memory caches.
    job.steps.push(Step {
        name: Some("Prepare working directories".to_string()),
        run: Some(
            "mkdir -p /tmp/gh-aw/logs /tmp/gh-aw/safe-outputs /tmp/gh-aw/mcp-config /tmp/gh-aw/patches"
                .to_string(),
        ),
        ..Step::default()
    });
    if inputs.tools.get("cache-memory").is_some() {
        job.steps.push(Step {
            name: Some("Restore agent memory".to_string()),
            uses: Some("actions/cache@v4".to_string()),
            with: BTreeMap::from([
                ("path".to_string(), "/tmp/gh-aw/cache-memory".to_string()),
                (
                    "key".to_string(),
                    format!("gh-aw-memory-{}-${{{{ github.run_id }}}}", inputs.spec_id),
                ),
                (
                    "restore-keys".to_string(),
                    format!("gh-aw-memory-{}-", inputs.spec_id),
                ),
            ]),
            ..Step::default()
        });
    }

    // Network hardening: the runtime proxy reads the allowlist file and
    // aborts the agent step on violations.
    if let Some(domains) = network::resolve(inputs.frontmatter.network.as_ref()) {
        let firewall = inputs
            .frontmatter
            .network
            .as_ref()
            .and_then(|n| n.firewall)
            .unwrap_or(true);
        job.steps.push(Step {
            name: Some("Write network allowlist".to_string()),
            run: Some(write_file_script(
                "/tmp/gh-aw/network-allowlist.txt",
                &domains.join("\n"),
            )),
            env: BTreeMap::from([(
                "GH_AW_FIREWALL".to_string(),
                firewall.to_string(),
            )]),
            ..Step::default()
        });
    }

    // e. Safe-outputs collector service.
    if inputs.plan.enabled() {
        job.steps.push(Step {
            name: Some("Start safe-outputs collector".to_string()),
            id: Some("safe_outputs_service".to_string()),
            run: Some(SAFE_OUTPUTS_SERVICE_SCRIPT.to_string()),
            env: BTreeMap::from([(
                "GH_AW_ALLOWED_TYPES".to_string(),
                inputs
                    .plan
                    .outputs
                    .iter()
                    .map(|o| o.name.clone())
                    .collect::<Vec<_>>()
                    .join(","),
            )]),
            ..Step::default()
        });
    }

    // f. MCP configuration. Actions expressions in server values are
    // extracted into numbered step env vars so the heredoc below never
    // carries a `${{ secrets.… }}` literal; the unquoted delimiter lets the
    // shell substitute them back at write time.
    let mut servers = mcp_servers(inputs);
    let mut hidden_env = BTreeMap::new();
    if !servers.is_empty() {
        hidden_env = hide_server_expressions(&mut servers);
        let config = render_config(&servers, engine.mcp_format())?;
        job.steps.push(Step {
            name: Some("Render MCP configuration".to_string()),
            run: Some(write_file_script_expanding(engine.mcp_config_path(), &config)),
            env: hidden_env.clone(),
            ..Step::default()
        });
    }

    // g. Prompt file.
    job.steps.push(Step {
        name: Some("Write agent prompt".to_string()),
        run: Some(write_file_script(PROMPT_PATH, inputs.body)),
        ..Step::default()
    });

    // h. Engine invocation. The hidden-expression env rides along so
    // escaped `${VAR}` references in rendered configs resolve inside the
    // engine process as well.
    if let Some(mut invoke) = engine.invoke_step(&engine_spec) {
        invoke.env.extend(hidden_env.clone());
        invoke.env.insert(
            "GH_AW_GITHUB_TOKEN".to_string(),
            GITHUB_TOKEN_CASCADE.to_string(),
        );
        invoke.env.insert(
            "GH_AW_WORKFLOW_NAME".to_string(),
            workflow_name.to_string(),
        );
        invoke.env.insert(
            "GH_AW_SAFE_OUTPUTS".to_string(),
            SAFE_OUTPUTS_MANIFEST.to_string(),
        );
        if let Some((name, secret)) = engine_secret(engine) {
            invoke.env.insert(name.to_string(), secret.to_string());
        }
        job.steps.push(invoke);
    }

    // i. Redaction over everything the agent wrote.
    let mut redact = Step {
        name: Some("Redact secrets".to_string()),
        if_cond: Some("always()".to_string()),
        run: Some(format!(
            "node - <<'GH_AW_REDACT_EOF'\n{}GH_AW_REDACT_EOF",
            js::bundled(js::REDACT_ENTRY)?
        )),
        ..Step::default()
    };
    redact.env = redaction_env(engine);
    job.steps.push(redact);

    // j. Logs, summary, artifacts.
    let mut parse_logs = Step::github_script(
        "Render run summary",
        None,
        js::bundled(js::LOG_PARSER_ENTRY)?,
    );
    parse_logs.if_cond = Some("always()".to_string());
    job.steps.push(parse_logs);
    job.steps.push(Step {
        name: Some("Upload agent logs".to_string()),
        uses: Some("actions/upload-artifact@v4".to_string()),
        if_cond: Some("always()".to_string()),
        with: BTreeMap::from([
            ("name".to_string(), "gh-aw-logs".to_string()),
            ("path".to_string(), "/tmp/gh-aw/logs".to_string()),
            ("if-no-files-found".to_string(), "ignore".to_string()),
        ]),
        ..Step::default()
    });
    if inputs.plan.enabled() {
        job.steps.push(Step {
            name: Some("Upload safe outputs".to_string()),
            uses: Some("actions/upload-artifact@v4".to_string()),
            if_cond: Some("always()".to_string()),
            with: BTreeMap::from([
                ("name".to_string(), "safe-outputs".to_string()),
                ("path".to_string(), "/tmp/gh-aw/safe-outputs".to_string()),
                ("if-no-files-found".to_string(), "ignore".to_string()),
            ]),
            ..Step::default()
        });
    }

    Ok(job)
}

/// Launches the collector container on a dynamically chosen port with a
/// per-run shared key. The key is masked before it is exported.
const SAFE_OUTPUTS_SERVICE_SCRIPT: &str = r#"GH_AW_SAFE_OUTPUTS_KEY="$(openssl rand -hex 32)"
echo "::add-mask::$GH_AW_SAFE_OUTPUTS_KEY"
GH_AW_SAFE_OUTPUTS_PORT="$(shuf -i 49152-65535 -n 1)"
docker run -d --rm \
  --name gh-aw-safe-outputs \
  -p "127.0.0.1:${GH_AW_SAFE_OUTPUTS_PORT}:8080" \
  -v /tmp/gh-aw/safe-outputs:/data \
  -e GH_AW_SAFE_OUTPUTS_KEY \
  -e GH_AW_ALLOWED_TYPES \
  ghcr.io/githubnext/gh-aw/safe-outputs:v0.4.0
{
  echo "GH_AW_SAFE_OUTPUTS_KEY=$GH_AW_SAFE_OUTPUTS_KEY"
  echo "GH_AW_SAFE_OUTPUTS_PORT=$GH_AW_SAFE_OUTPUTS_PORT"
} >> "$GITHUB_ENV""#;

fn agent_permissions(frontmatter: &Frontmatter) -> Vec<(String, String)> {
    match frontmatter.permissions.clone().unwrap_or_default() {
        Permissions::Shorthand(s) => vec![(s, String::new())],
        Permissions::Scopes(scopes) => scopes.into_iter().collect(),
    }
}

fn engine_version(spec: &crate::frontmatter::EngineSpec) -> Option<&str> {
    match spec {
        crate::frontmatter::EngineSpec::Id(_) => None,
        crate::frontmatter::EngineSpec::Detailed { version, .. } => version.as_deref(),
    }
}

/// Secret env var each engine runtime expects.
fn engine_secret(engine: EngineKind) -> Option<(&'static str, &'static str)> {
    match engine {
        EngineKind::Copilot => Some((
            "GITHUB_COPILOT_CLI_TOKEN",
            "${{ secrets.GH_AW_COPILOT_CLI_TOKEN || secrets.GITHUB_TOKEN }}",
        )),
        EngineKind::Claude => Some(("ANTHROPIC_API_KEY", "${{ secrets.ANTHROPIC_API_KEY }}")),
        EngineKind::Codex | EngineKind::Genaiscript => {
            Some(("OPENAI_API_KEY", "${{ secrets.OPENAI_API_KEY }}"))
        },
        EngineKind::Custom => None,
    }
}

/// The env given to the redaction step: every secret the compiler wired
/// into this workflow, plus the name list the script walks.
fn redaction_env(engine: EngineKind) -> BTreeMap<String, String> {
    let mut env = BTreeMap::from([
        (
            "SECRET_GH_AW_GITHUB_TOKEN".to_string(),
            GITHUB_TOKEN_CASCADE.to_string(),
        ),
        (
            "SECRET_GITHUB_TOKEN".to_string(),
            "${{ secrets.GITHUB_TOKEN }}".to_string(),
        ),
    ]);
    if let Some((name, secret)) = engine_secret(engine) {
        env.insert(format!("SECRET_{name}"), secret.to_string());
    }
    let names: Vec<String> = env.keys().cloned().collect();
    env.insert("GH_AW_SECRET_NAMES".to_string(), names.join(","));
    env.insert("GH_AW_REDACT_ROOT".to_string(), "/tmp/gh-aw".to_string());
    env
}

fn mcp_servers(inputs: &BuildInputs<'_>) -> Vec<NamedServer> {
    let mut servers = inputs.tools.mcp_servers();
    if inputs.plan.enabled() {
        servers.push(NamedServer {
            name: SAFE_OUTPUTS_SERVER_NAME.to_string(),
            spec: safe_outputs_server(),
            allowed: None,
        });
    }
    servers
}

/// Emit a heredoc that writes `content` to `path`. The quoted delimiter
/// suppresses shell expansion inside the document.
fn write_file_script(path: &str, content: &str) -> String {
    let mut body = content.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    format!("mkdir -p \"$(dirname {path})\"\ncat > {path} <<'GH_AW_EOF'\n{body}GH_AW_EOF")
}

/// Like [`write_file_script`] but with an unquoted delimiter: `$VAR`
/// references are substituted from the step environment at write time.
fn write_file_script_expanding(path: &str, content: &str) -> String {
    let mut body = content.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    format!("mkdir -p \"$(dirname {path})\"\ncat > {path} <<GH_AW_EOF\n{body}GH_AW_EOF")
}

/// Pull every `${{ … }}` expression out of server env/header/url values,
/// replacing them with `$GH_AW_EXPR_<n>` references resolved from the
/// returned step env. Traversal order is deterministic (servers arrive
/// name-sorted, maps are ordered), so the numbering is stable.
fn hide_server_expressions(servers: &mut [NamedServer]) -> BTreeMap<String, String> {
    let mut values: Vec<String> = Vec::new();
    for server in servers.iter() {
        values.extend(server.spec.env.values().cloned());
        values.extend(server.spec.headers.values().cloned());
        if let Some(ref url) = server.spec.url {
            values.push(url.clone());
        }
    }

    let hidden = hide_expressions(&values);
    let mut rewritten = hidden.rewritten.into_iter();
    for server in servers.iter_mut() {
        for value in server.spec.env.values_mut() {
            *value = rewritten.next().unwrap_or_default();
        }
        for value in server.spec.headers.values_mut() {
            *value = rewritten.next().unwrap_or_default();
        }
        if let Some(url) = server.spec.url.as_mut() {
            *url = rewritten.next().unwrap_or_default();
        }
    }
    hidden.env.into_iter().collect()
}

// ── threat detection ────────────────────────────────────────────────────────

fn threat_detection_job(inputs: &BuildInputs<'_>) -> Result<Job> {
    let mut job = Job::new("threat_detection");
    job.needs.push("agent".to_string());
    job.if_cond = Some("always() && !cancelled()".to_string());
    job.permissions = vec![("contents".to_string(), "read".to_string())];
    job.outputs.insert(
        "verdict".to_string(),
        "${{ steps.scan.outputs.verdict }}".to_string(),
    );

    job.steps.push(Step {
        name: Some("Download safe outputs".to_string()),
        uses: Some("actions/download-artifact@v4".to_string()),
        continue_on_error: true,
        with: BTreeMap::from([
            ("name".to_string(), "safe-outputs".to_string()),
            ("path".to_string(), "/tmp/gh-aw/safe-outputs".to_string()),
        ]),
        ..Step::default()
    });
    job.steps.push(Step::github_script(
        "Scan outputs for injected instructions",
        Some("scan"),
        js::bundled(js::THREAT_DETECTION_ENTRY)?,
    ));

    // Extra reviewer-supplied steps from `threat-detection.steps`.
    if let Some(steps) = inputs
        .plan
        .threat_detection
        .as_ref()
        .and_then(|config| config.get("steps"))
        .and_then(Value::as_sequence)
    {
        for raw in steps {
            job.steps.push(Step {
                raw: Some(raw.clone()),
                ..Step::default()
            });
        }
    }
    Ok(job)
}

// ── conclusion jobs ─────────────────────────────────────────────────────────

fn conclusion_job(
    inputs: &BuildInputs<'_>,
    output: &crate::safe_outputs::OutputType,
) -> Result<Job> {
    let mut job = Job::new(&output.job_name());
    job.needs.push("agent".to_string());
    job.permissions = output
        .permissions()
        .iter()
        .map(|(scope, level)| ((*scope).to_string(), (*level).to_string()))
        .collect();

    let gated = inputs.plan.threat_detection.is_some();
    if gated {
        job.needs.push("threat_detection".to_string());
        job.if_cond = Some(
            "always() && !cancelled() && needs.threat_detection.outputs.verdict == 'clean'"
                .to_string(),
        );
    } else {
        job.if_cond = Some("always() && !cancelled()".to_string());
    }

    job.steps.push(Step {
        name: Some("Download safe outputs".to_string()),
        uses: Some("actions/download-artifact@v4".to_string()),
        continue_on_error: true,
        with: BTreeMap::from([
            ("name".to_string(), "safe-outputs".to_string()),
            ("path".to_string(), "/tmp/gh-aw/safe-outputs".to_string()),
        ]),
        ..Step::default()
    });

    let mut env = BTreeMap::from([
        ("GH_AW_OUTPUT_TYPE".to_string(), output.name.clone()),
        ("GH_AW_SAFE_OUTPUTS".to_string(), SAFE_OUTPUTS_MANIFEST.to_string()),
        ("GH_AW_STAGED".to_string(), inputs.plan.staged.to_string()),
        (
            "GH_AW_IF_NO_CHANGES".to_string(),
            output.if_no_changes().to_string(),
        ),
    ]);
    if let Some(max) = output.max() {
        env.insert("GH_AW_MAX".to_string(), max.to_string());
    }
    if let Some(prefix) = output.options.get("title-prefix").and_then(Value::as_str) {
        env.insert("GH_AW_TITLE_PREFIX".to_string(), prefix.to_string());
    }
    if let Some(labels) = output.options.get("labels").and_then(Value::as_sequence) {
        let labels: Vec<&str> = labels.iter().filter_map(Value::as_str).collect();
        env.insert("GH_AW_LABELS".to_string(), labels.join(","));
    }
    if output.name == "push-to-pull-request-branch" || output.name == "create-pull-request" {
        env.insert(
            "GH_AW_MAX_PATCH_SIZE".to_string(),
            inputs.plan.max_patch_size.to_string(),
        );
    }

    let mut process = Step::github_script(
        &format!("Process {} requests", output.name),
        None,
        js::bundled(js::SAFE_OUTPUTS_ENTRY)?,
    );
    process
        .with
        .insert("github-token".to_string(), GITHUB_TOKEN_CASCADE.to_string());
    process.env = env;
    job.steps.push(process);
    Ok(job)
}
