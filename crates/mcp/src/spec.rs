//! The MCP server model parsed from frontmatter `mcp:` blocks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the synthesized safe-outputs server.
pub const SAFE_OUTPUTS_SERVER_NAME: &str = "safeoutputs";

/// URL of the safe-outputs collector as seen from inside engine containers.
pub const SAFE_OUTPUTS_URL: &str = "http://host.docker.internal:$GH_AW_SAFE_OUTPUTS_PORT";

/// How a server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    Stdio,
    Http,
    Docker,
}

/// One MCP server definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct McpServerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<McpTransport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Container image for docker-launched stdio servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl McpServerSpec {
    /// Parse the `mcp:` block of a frontmatter tool entry.
    pub fn from_value(tool: &str, value: &serde_yaml::Value) -> Result<Self> {
        let spec: Self =
            serde_yaml::from_value(value.clone()).map_err(|e| Error::InvalidServer {
                tool: tool.to_string(),
                reason: e.to_string(),
            })?;
        spec.validate(tool)?;
        Ok(spec)
    }

    /// Effective transport: explicit `type:` wins, otherwise inferred from
    /// `url` / `container` / `command`.
    #[must_use]
    pub fn transport(&self) -> McpTransport {
        if let Some(t) = self.r#type {
            return t;
        }
        if self.url.is_some() {
            McpTransport::Http
        } else if self.container.is_some() {
            McpTransport::Docker
        } else {
            McpTransport::Stdio
        }
    }

    fn validate(&self, tool: &str) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::InvalidServer {
                tool: tool.to_string(),
                reason: reason.to_string(),
            })
        };
        match self.transport() {
            McpTransport::Http => {
                if self.url.is_none() {
                    return invalid("http servers require `url`");
                }
                if self.command.is_some() || self.container.is_some() {
                    return invalid("http servers cannot set `command` or `container`");
                }
            },
            McpTransport::Docker => {
                if self.container.is_none() {
                    return invalid("docker servers require `container`");
                }
            },
            McpTransport::Stdio => {
                if self.command.is_none() && self.container.is_none() {
                    return invalid("stdio servers require `command` or `container`");
                }
            },
        }
        Ok(())
    }

    /// The gateway policy: servers listed here may not run as bare host
    /// commands; they must declare a container.
    pub fn enforce_container_policy(&self, server: &str) -> Result<()> {
        const MUST_BE_CONTAINERIZED: &[&str] = &["agentic-workflows"];
        if MUST_BE_CONTAINERIZED.contains(&server)
            && self.container.is_none()
            && let Some(ref command) = self.command
        {
            return Err(Error::ContainerRequired {
                server: server.to_string(),
                command: command.clone(),
            });
        }
        Ok(())
    }
}

/// The synthesized safe-outputs server: HTTP against the collector the
/// agent job launches, authenticated with the per-run API key.
#[must_use]
pub fn safe_outputs_server() -> McpServerSpec {
    McpServerSpec {
        r#type: Some(McpTransport::Http),
        command: None,
        args: Vec::new(),
        container: None,
        entrypoint: None,
        entrypoint_args: Vec::new(),
        mounts: Vec::new(),
        env: BTreeMap::new(),
        url: Some(SAFE_OUTPUTS_URL.to_string()),
        headers: BTreeMap::from([(
            "X-Safe-Outputs-Key".to_string(),
            "$GH_AW_SAFE_OUTPUTS_KEY".to_string(),
        )]),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn stdio_from_command() {
        let spec = McpServerSpec::from_value(
            "tavily",
            &yaml("command: npx\nargs: [\"-y\", \"tavily-mcp\"]"),
        )
        .unwrap();
        assert_eq!(spec.transport(), McpTransport::Stdio);
        assert_eq!(spec.args, vec!["-y", "tavily-mcp"]);
    }

    #[test]
    fn http_inferred_from_url() {
        let spec =
            McpServerSpec::from_value("api", &yaml("url: https://mcp.example.com")).unwrap();
        assert_eq!(spec.transport(), McpTransport::Http);
    }

    #[test]
    fn docker_inferred_from_container() {
        let spec = McpServerSpec::from_value(
            "gh",
            &yaml("container: ghcr.io/github/github-mcp-server\nenv:\n  TOKEN: x"),
        )
        .unwrap();
        assert_eq!(spec.transport(), McpTransport::Docker);
    }

    #[test]
    fn http_with_command_rejected() {
        let err = McpServerSpec::from_value(
            "bad",
            &yaml("url: https://x\ncommand: run"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidServer { .. }));
    }

    #[test]
    fn bare_server_without_command_rejected() {
        assert!(McpServerSpec::from_value("bad", &yaml("args: [x]")).is_err());
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(McpServerSpec::from_value("bad", &yaml("command: x\nbogus: 1")).is_err());
    }

    #[test]
    fn container_policy() {
        let bare = McpServerSpec::from_value("agentic-workflows", &yaml("command: gh")).unwrap();
        assert!(matches!(
            bare.enforce_container_policy("agentic-workflows"),
            Err(Error::ContainerRequired { .. })
        ));
        // Other servers may run bare commands.
        assert!(bare.enforce_container_policy("tavily").is_ok());
        let containerized = McpServerSpec::from_value(
            "agentic-workflows",
            &yaml("container: ghcr.io/githubnext/gh-aw-mcp"),
        )
        .unwrap();
        assert!(containerized.enforce_container_policy("agentic-workflows").is_ok());
    }

    #[test]
    fn safe_outputs_shape() {
        let server = safe_outputs_server();
        assert_eq!(server.transport(), McpTransport::Http);
        assert!(server.url.as_deref().unwrap().contains("host.docker.internal"));
        assert!(server.headers.contains_key("X-Safe-Outputs-Key"));
    }
}
