use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid mcp configuration for tool '{tool}': {reason}")]
    InvalidServer { tool: String, reason: String },

    #[error("server '{server}' must run containerized (raw `command: {command}` is not allowed)")]
    ContainerRequired { server: String, command: String },

    #[error("failed to render {format} config: {reason}")]
    Render { format: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
