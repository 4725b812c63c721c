use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Content is not valid UTF-8 text (NUL bytes present).
    #[error("binary content in {path}")]
    Binary { path: String },

    /// Frontmatter fence opened but never closed.
    #[error("unterminated frontmatter: opening --- on line 1 has no closing fence")]
    UnterminatedFrontmatter,

    /// YAML syntax failure, localized to source coordinates.
    #[error("YAML syntax error: {message}")]
    Yaml {
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
