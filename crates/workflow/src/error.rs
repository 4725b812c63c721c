use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Mcp(#[from] ghaw_mcp::Error),

    #[error(transparent)]
    Bundler(#[from] ghaw_bundler::Error),

    #[error("invalid frontmatter: {0}")]
    Frontmatter(String),

    #[error("emission invariant violated: {0}")]
    Emission(String),
}

pub type Result<T> = std::result::Result<T, Error>;
