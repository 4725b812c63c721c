use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot resolve import '{reference}': {reason}")]
    Unresolved { reference: String, reason: String },

    #[error("import cycle: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("authentication failed fetching '{reference}' (set GITHUB_TOKEN or GH_TOKEN)")]
    Auth { reference: String },

    #[error("'{reference}' not found at ref '{git_ref}'")]
    NotFound { reference: String, git_ref: String },

    #[error("fetch failed for '{reference}': {reason}")]
    Fetch { reference: String, reason: String },

    #[error("cannot merge '{path}': {left} vs {right}")]
    Merge {
        path: String,
        left: &'static str,
        right: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
