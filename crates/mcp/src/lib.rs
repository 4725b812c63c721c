//! MCP server configuration: the server model and per-engine emission.
//!
//! Each AI engine consumes MCP server definitions in its own dialect
//! (copilot and claude want JSON with different escaping, codex wants TOML,
//! custom engines get plain JSON at a known path). This crate owns the
//! server model, the token cascade, and the expression-hiding transform
//! that keeps `${{ }}` expressions out of shell-visible arguments.

pub mod emit;
pub mod error;
pub mod spec;
pub mod tokens;

pub use {
    emit::{McpFormat, NamedServer, render_config},
    error::{Error, Result},
    spec::{McpServerSpec, McpTransport, SAFE_OUTPUTS_SERVER_NAME, safe_outputs_server},
    tokens::{GITHUB_TOKEN_CASCADE, HiddenExpressions, hide_expressions},
};
