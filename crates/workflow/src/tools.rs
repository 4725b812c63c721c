//! Tool resolution: from the frontmatter `tools:` map to a canonical set.
//!
//! Reserved names expand to built-in behaviors (several of which are MCP
//! servers with curated defaults); any other entry must carry an `mcp:`
//! block and becomes a custom server. `bash` is a policy, not a server.

use std::collections::BTreeMap;

use {
    ghaw_common::Diagnostic,
    ghaw_mcp::{GITHUB_TOKEN_CASCADE, McpServerSpec, NamedServer},
    serde_yaml::Value,
};

use crate::{error::Result, frontmatter::Frontmatter, network};

/// Container image for the GitHub MCP server.
const GITHUB_MCP_IMAGE: &str = "ghcr.io/github/github-mcp-server:v0.18.0";
/// Container image for the playwright MCP server.
const PLAYWRIGHT_MCP_IMAGE: &str = "mcr.microsoft.com/playwright/mcp:v0.0.41";
/// Container image for the agentic-workflows MCP server (gateway policy
/// forbids running this one as a bare `gh` command).
const AGENTIC_WORKFLOWS_MCP_IMAGE: &str = "ghcr.io/githubnext/gh-aw/mcp-server:v0.4.0";

/// Shell command policy for the `bash` tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BashPolicy {
    /// Any command (`bash:` null or `"*"`).
    Any,
    /// Glob allowlist.
    Patterns(Vec<String>),
}

/// Canonical classification of one tool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolKind {
    Github,
    Playwright,
    AgenticWorkflows,
    CacheMemory,
    RepoMemory,
    Serena,
    Bash(BashPolicy),
    Edit,
    WebFetch,
    WebSearch,
    CustomMcp,
}

/// A resolved tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub kind: ToolKind,
    /// Tool-name allowlist surfaced to engines for MCP-backed tools.
    pub allowed: Option<Vec<String>>,
    /// Server definition for MCP-backed tools.
    pub mcp: Option<McpServerSpec>,
}

/// The full resolved tool set, ordered by tool name.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    pub tools: BTreeMap<String, ToolSpec>,
}

impl ToolSet {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    #[must_use]
    pub fn bash_policy(&self) -> Option<&BashPolicy> {
        match self.tools.get("bash").map(|t| &t.kind) {
            Some(ToolKind::Bash(policy)) => Some(policy),
            _ => None,
        }
    }

    /// MCP servers to expose to the engine, in name order. Only tools that
    /// are actually MCP-backed appear; engine-native tools never leak into
    /// the server config.
    #[must_use]
    pub fn mcp_servers(&self) -> Vec<NamedServer> {
        self.tools
            .values()
            .filter_map(|tool| {
                tool.mcp.as_ref().map(|spec| NamedServer {
                    name: tool.name.clone(),
                    spec: spec.clone(),
                    allowed: tool.allowed.clone(),
                })
            })
            .collect()
    }
}

/// Resolve the `tools:` map. Problems surface as diagnostics, not errors,
/// so one bad tool does not hide the rest.
pub fn resolve_tools(frontmatter: &Frontmatter) -> Result<(ToolSet, Vec<Diagnostic>)> {
    let mut set = ToolSet::default();
    let mut diagnostics = Vec::new();

    for (name, config) in &frontmatter.tools {
        let path = format!("tools.{name}");
        let spec = match name.as_str() {
            "github" => github_tool(config),
            "playwright" => playwright_tool(config),
            "agentic-workflows" => agentic_workflows_tool(),
            "cache-memory" => builtin(name, ToolKind::CacheMemory),
            "repo-memory" => builtin(name, ToolKind::RepoMemory),
            "serena" => builtin(name, ToolKind::Serena),
            "edit" => builtin(name, ToolKind::Edit),
            "web-fetch" => builtin(name, ToolKind::WebFetch),
            "web-search" => builtin(name, ToolKind::WebSearch),
            "bash" => bash_tool(config),
            "safe-outputs" => {
                diagnostics.push(Diagnostic::warning(
                    "merge",
                    path,
                    "the safe-outputs server is synthesized from `safe-outputs:`; this entry is ignored",
                ));
                continue;
            },
            _ => match custom_tool(name, config) {
                Ok(spec) => spec,
                Err(message) => {
                    diagnostics.push(Diagnostic::error("merge", path, message));
                    continue;
                },
            },
        };
        set.tools.insert(name.clone(), spec);
    }

    Ok((set, diagnostics))
}

fn builtin(name: &str, kind: ToolKind) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        kind,
        allowed: None,
        mcp: None,
    }
}

fn allowed_list(config: &Value) -> Option<Vec<String>> {
    match config.get("allowed") {
        Some(Value::String(s)) if s == "*" => None,
        Some(Value::Sequence(items)) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

// ── Reserved tools ──────────────────────────────────────────────────────────

fn github_tool(config: &Value) -> ToolSpec {
    let read_only = config
        .get("read-only")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let toolset = config
        .get("toolset")
        .and_then(Value::as_str)
        .unwrap_or("default");

    let mut env = BTreeMap::from([(
        "GITHUB_PERSONAL_ACCESS_TOKEN".to_string(),
        GITHUB_TOKEN_CASCADE.to_string(),
    )]);
    env.insert("GITHUB_TOOLSETS".to_string(), toolset.to_string());
    if read_only {
        env.insert("GITHUB_READ_ONLY".to_string(), "1".to_string());
    }

    ToolSpec {
        name: "github".to_string(),
        kind: ToolKind::Github,
        allowed: allowed_list(config),
        mcp: Some(McpServerSpec {
            r#type: None,
            command: None,
            args: Vec::new(),
            container: Some(GITHUB_MCP_IMAGE.to_string()),
            entrypoint: None,
            entrypoint_args: Vec::new(),
            mounts: Vec::new(),
            env,
            url: None,
            headers: BTreeMap::new(),
        }),
    }
}

fn playwright_tool(config: &Value) -> ToolSpec {
    // Domain options reuse the network bundle vocabulary; the loopback
    // addresses are always present so the agent can reach services it
    // starts itself.
    let mut domains: Vec<String> = vec!["127.0.0.1".to_string(), "localhost".to_string()];
    if let Some(Value::Sequence(items)) = config.get("allowed_domains") {
        let entries: Vec<String> = items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        domains.extend(network::expand_allowed(&entries));
    }
    domains.sort();
    domains.dedup();

    ToolSpec {
        name: "playwright".to_string(),
        kind: ToolKind::Playwright,
        allowed: allowed_list(config),
        mcp: Some(McpServerSpec {
            r#type: None,
            command: None,
            args: Vec::new(),
            container: Some(PLAYWRIGHT_MCP_IMAGE.to_string()),
            entrypoint: None,
            entrypoint_args: vec![format!("--allowed-origins={}", domains.join(";"))],
            mounts: Vec::new(),
            env: BTreeMap::new(),
            url: None,
            headers: BTreeMap::new(),
        }),
    }
}

fn agentic_workflows_tool() -> ToolSpec {
    ToolSpec {
        name: "agentic-workflows".to_string(),
        kind: ToolKind::AgenticWorkflows,
        allowed: None,
        mcp: Some(McpServerSpec {
            r#type: None,
            command: None,
            args: Vec::new(),
            container: Some(AGENTIC_WORKFLOWS_MCP_IMAGE.to_string()),
            entrypoint: None,
            entrypoint_args: Vec::new(),
            mounts: Vec::new(),
            env: BTreeMap::from([(
                "GITHUB_TOKEN".to_string(),
                GITHUB_TOKEN_CASCADE.to_string(),
            )]),
            url: None,
            headers: BTreeMap::new(),
        }),
    }
}

fn bash_tool(config: &Value) -> ToolSpec {
    let policy = match config {
        Value::Null => BashPolicy::Any,
        Value::String(s) if s == "*" => BashPolicy::Any,
        Value::Sequence(items) => BashPolicy::Patterns(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        _ => BashPolicy::Any,
    };
    ToolSpec {
        name: "bash".to_string(),
        kind: ToolKind::Bash(policy),
        allowed: None,
        mcp: None,
    }
}

fn custom_tool(name: &str, config: &Value) -> std::result::Result<ToolSpec, String> {
    let Some(mcp_value) = config.get("mcp") else {
        return Err(format!(
            "unknown tool '{name}': custom tools must declare an `mcp:` block"
        ));
    };
    let spec = McpServerSpec::from_value(name, mcp_value).map_err(|e| e.to_string())?;
    spec.enforce_container_policy(name).map_err(|e| e.to_string())?;
    Ok(ToolSpec {
        name: name.to_string(),
        kind: ToolKind::CustomMcp,
        allowed: allowed_list(config),
        mcp: Some(spec),
    })
}
