//! Per-engine rendering of MCP server configuration.

use std::sync::LazyLock;

use {
    regex::Regex,
    serde_json::{Map, Value as Json, json},
};

use crate::{
    error::{Error, Result},
    spec::{McpServerSpec, McpTransport},
};

/// Output dialect, one per engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpFormat {
    /// JSON with a `type` field; env references double-escaped (`\${VAR}`).
    Copilot,
    /// JSON without `type`; shell-style env references (`$VAR`).
    Claude,
    /// TOML under `[mcp_servers.<name>]`.
    Codex,
    /// Plain JSON written to a path consumed by user-supplied steps.
    Custom,
}

/// A server plus the tool allowlist surfaced to the engine.
#[derive(Debug, Clone)]
pub struct NamedServer {
    pub name: String,
    pub spec: McpServerSpec,
    /// `None` = expose every tool; `Some` = explicit allowlist.
    pub allowed: Option<Vec<String>>,
}

/// Render the configuration for all `servers` in the given dialect.
///
/// Servers are emitted sorted by name; the output is stable across runs.
pub fn render_config(servers: &[NamedServer], format: McpFormat) -> Result<String> {
    let mut sorted: Vec<&NamedServer> = servers.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    match format {
        McpFormat::Codex => render_toml(&sorted),
        _ => render_json(&sorted, format),
    }
}

// ── JSON dialects ───────────────────────────────────────────────────────────

fn render_json(servers: &[&NamedServer], format: McpFormat) -> Result<String> {
    let mut entries = Map::new();
    for server in servers {
        entries.insert(server.name.clone(), server_json(server, format));
    }
    let config = json!({ "mcpServers": entries });
    serde_json::to_string_pretty(&config).map_err(|e| Error::Render {
        format: "json",
        reason: e.to_string(),
    })
}

fn server_json(server: &NamedServer, format: McpFormat) -> Json {
    let spec = &server.spec;
    let mut entry = Map::new();

    match spec.transport() {
        McpTransport::Http => {
            if matches!(format, McpFormat::Copilot | McpFormat::Custom) {
                entry.insert("type".into(), json!("http"));
            }
            entry.insert("url".into(), json!(escape(spec.url.as_deref().unwrap_or(""), format)));
            if !spec.headers.is_empty() {
                let headers: Map<String, Json> = spec
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), json!(escape(v, format))))
                    .collect();
                entry.insert("headers".into(), Json::Object(headers));
            }
        },
        McpTransport::Stdio | McpTransport::Docker => {
            if matches!(format, McpFormat::Copilot | McpFormat::Custom) {
                entry.insert("type".into(), json!("stdio"));
            }
            let (command, args) = launch_command(spec);
            entry.insert("command".into(), json!(command));
            if !args.is_empty() {
                entry.insert(
                    "args".into(),
                    Json::Array(args.iter().map(|a| json!(escape(a, format))).collect()),
                );
            }
            if !spec.env.is_empty() {
                let env: Map<String, Json> = spec
                    .env
                    .iter()
                    .map(|(k, v)| (k.clone(), json!(escape(v, format))))
                    .collect();
                entry.insert("env".into(), Json::Object(env));
            }
        },
    }

    if let Some(ref allowed) = server.allowed {
        entry.insert("tools".into(), json!(allowed));
    }
    Json::Object(entry)
}

// ── TOML dialect ────────────────────────────────────────────────────────────

fn render_toml(servers: &[&NamedServer]) -> Result<String> {
    let mut root = toml::Table::new();
    let mut table = toml::Table::new();
    for server in servers {
        let spec = &server.spec;
        let mut entry = toml::Table::new();
        match spec.transport() {
            McpTransport::Http => {
                entry.insert(
                    "url".into(),
                    toml::Value::String(spec.url.clone().unwrap_or_default()),
                );
                if !spec.headers.is_empty() {
                    let mut headers = toml::Table::new();
                    for (k, v) in &spec.headers {
                        headers.insert(k.clone(), toml::Value::String(v.clone()));
                    }
                    entry.insert("headers".into(), toml::Value::Table(headers));
                }
            },
            McpTransport::Stdio | McpTransport::Docker => {
                let (command, args) = launch_command(spec);
                entry.insert("command".into(), toml::Value::String(command));
                if !args.is_empty() {
                    entry.insert(
                        "args".into(),
                        toml::Value::Array(
                            args.into_iter().map(toml::Value::String).collect(),
                        ),
                    );
                }
                if !spec.env.is_empty() {
                    let mut env = toml::Table::new();
                    for (k, v) in &spec.env {
                        env.insert(k.clone(), toml::Value::String(v.clone()));
                    }
                    entry.insert("env".into(), toml::Value::Table(env));
                }
            },
        }
        if let Some(ref allowed) = server.allowed {
            entry.insert(
                "tools".into(),
                toml::Value::Array(
                    allowed
                        .iter()
                        .map(|t| toml::Value::String(t.clone()))
                        .collect(),
                ),
            );
        }
        table.insert(server.name.clone(), toml::Value::Table(entry));
    }
    root.insert("mcp_servers".into(), toml::Value::Table(table));
    toml::to_string(&root).map_err(|e| Error::Render {
        format: "toml",
        reason: e.to_string(),
    })
}

// ── Launch command synthesis ────────────────────────────────────────────────

/// The command line that starts a stdio server. Container-backed servers
/// run through `docker run`, with env names forwarded via `-e` so the
/// values stay in the process environment.
fn launch_command(spec: &McpServerSpec) -> (String, Vec<String>) {
    if let Some(ref container) = spec.container {
        let mut args = vec!["run".to_string(), "--rm".to_string(), "-i".to_string()];
        for mount in &spec.mounts {
            args.push("-v".to_string());
            args.push(mount.clone());
        }
        for key in spec.env.keys() {
            args.push("-e".to_string());
            args.push(key.clone());
        }
        if let Some(ref entrypoint) = spec.entrypoint {
            args.push("--entrypoint".to_string());
            args.push(entrypoint.clone());
        }
        args.push(container.clone());
        args.extend(spec.entrypoint_args.iter().cloned());
        ("docker".to_string(), args)
    } else {
        (
            spec.command.clone().unwrap_or_default(),
            spec.args.clone(),
        )
    }
}

// ── Env reference escaping ──────────────────────────────────────────────────

static ENV_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\$(\{\{[^}]*\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("env reference regex")
});

/// Normalize `$VAR` / `${VAR}` references to the dialect's expected form.
/// Actions expressions (`${{ … }}`) pass through untouched; they are
/// expanded by the runner before the engine ever sees the file.
fn escape(value: &str, format: McpFormat) -> String {
    ENV_REF_RE
        .replace_all(value, |captures: &regex::Captures<'_>| {
            let whole = &captures[0];
            if whole.starts_with("${{") {
                return whole.to_string();
            }
            let name = captures
                .get(2)
                .or_else(|| captures.get(3))
                .map_or("", |m| m.as_str());
            match format {
                McpFormat::Copilot => format!("\\${{{name}}}"),
                McpFormat::Claude => format!("${name}"),
                McpFormat::Codex | McpFormat::Custom => format!("${{{name}}}"),
            }
        })
        .into_owned()
}
