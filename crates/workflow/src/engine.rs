//! AI engine definitions: install steps, invocation, MCP dialects.

use std::collections::BTreeMap;

use ghaw_mcp::McpFormat;

use crate::{
    error::{Error, Result},
    frontmatter::EngineSpec,
    jobs::Step,
};

/// Pinned engine runtime versions, overridable via `engine.version`.
const COPILOT_CLI_VERSION: &str = "0.0.354";
const CLAUDE_CODE_VERSION: &str = "2.0.44";
const CODEX_CLI_VERSION: &str = "0.48.0";

/// Node version installed for npm-distributed engines.
const NODE_VERSION: &str = "24";

/// Path the MCP configuration is rendered to inside the runner.
pub const MCP_CONFIG_PATH: &str = "/tmp/gh-aw/mcp-config/config.json";
/// Path of the rendered prompt file.
pub const PROMPT_PATH: &str = "/tmp/gh-aw/prompt.md";

/// The supported engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Copilot,
    Claude,
    Codex,
    Custom,
    Genaiscript,
}

impl EngineKind {
    pub fn from_id(id: &str) -> Result<Self> {
        match id {
            "copilot" => Ok(Self::Copilot),
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "custom" => Ok(Self::Custom),
            "genaiscript" => Ok(Self::Genaiscript),
            other => Err(Error::Frontmatter(format!("unknown engine '{other}'"))),
        }
    }

    /// MCP config dialect consumed by this engine.
    #[must_use]
    pub fn mcp_format(self) -> McpFormat {
        match self {
            Self::Copilot => McpFormat::Copilot,
            Self::Claude => McpFormat::Claude,
            Self::Codex => McpFormat::Codex,
            Self::Custom | Self::Genaiscript => McpFormat::Custom,
        }
    }

    /// The MCP config file the invocation reads. Codex wants TOML.
    #[must_use]
    pub fn mcp_config_path(self) -> &'static str {
        match self {
            Self::Codex => "/tmp/gh-aw/mcp-config/config.toml",
            _ => MCP_CONFIG_PATH,
        }
    }

    /// Steps that install the engine runtime at a pinned version.
    #[must_use]
    pub fn install_steps(self, version: Option<&str>) -> Vec<Step> {
        let npm_install = |name: &str, package: &str, pinned: &str| {
            let version = version.unwrap_or(pinned).to_string();
            vec![
                Step {
                    name: Some("Setup Node.js".to_string()),
                    uses: Some("actions/setup-node@v4".to_string()),
                    with: BTreeMap::from([("node-version".to_string(), NODE_VERSION.to_string())]),
                    ..Step::default()
                },
                Step {
                    name: Some(format!("Install {name}")),
                    run: Some(format!("npm install -g {package}@{version}")),
                    ..Step::default()
                },
            ]
        };
        match self {
            Self::Copilot => npm_install("GitHub Copilot CLI", "@github/copilot", COPILOT_CLI_VERSION),
            Self::Claude => npm_install("Claude Code", "@anthropic-ai/claude-code", CLAUDE_CODE_VERSION),
            Self::Codex => npm_install("Codex CLI", "@openai/codex", CODEX_CLI_VERSION),
            Self::Genaiscript => npm_install("GenAIScript", "genaiscript", "2.5.0"),
            Self::Custom => Vec::new(),
        }
    }

    /// The step that runs the agent. Custom engines have none; the
    /// user-supplied steps are the engine.
    #[must_use]
    pub fn invoke_step(self, spec: &EngineSpec) -> Option<Step> {
        let mut env: BTreeMap<String, String> = spec.env();
        env.insert("GH_AW_PROMPT".to_string(), PROMPT_PATH.to_string());
        env.insert(
            "GH_AW_MCP_CONFIG".to_string(),
            self.mcp_config_path().to_string(),
        );
        if let Some(model) = spec.model() {
            env.insert("GH_AW_MODEL".to_string(), model.to_string());
        }
        if let Some(max_turns) = spec.max_turns() {
            env.insert("GH_AW_MAX_TURNS".to_string(), max_turns.to_string());
        }

        let run = match self {
            Self::Copilot => {
                "copilot --log-level debug --log-dir /tmp/gh-aw/logs \\\n  --mcp-config \"$GH_AW_MCP_CONFIG\" \\\n  ${GH_AW_MODEL:+--model \"$GH_AW_MODEL\"} \\\n  --allow-all-tools --prompt-file \"$GH_AW_PROMPT\""
            },
            Self::Claude => {
                "claude --print --output-format stream-json \\\n  --mcp-config \"$GH_AW_MCP_CONFIG\" \\\n  ${GH_AW_MODEL:+--model \"$GH_AW_MODEL\"} \\\n  ${GH_AW_MAX_TURNS:+--max-turns \"$GH_AW_MAX_TURNS\"} \\\n  \"$(cat \"$GH_AW_PROMPT\")\" | tee /tmp/gh-aw/logs/agent.jsonl"
            },
            Self::Codex => {
                "codex exec --full-auto \\\n  ${GH_AW_MODEL:+--model \"$GH_AW_MODEL\"} \\\n  \"$(cat \"$GH_AW_PROMPT\")\" 2>&1 | tee /tmp/gh-aw/logs/agent.log"
            },
            Self::Genaiscript => {
                "genaiscript run \"$GH_AW_PROMPT\" --mcp-config \"$GH_AW_MCP_CONFIG\" \\\n  --out /tmp/gh-aw/logs"
            },
            Self::Custom => return None,
        };

        Some(Step {
            name: Some("Run agent".to_string()),
            id: Some("agent".to_string()),
            run: Some(run.to_string()),
            env,
            ..Step::default()
        })
    }
}
