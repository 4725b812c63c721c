use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unresolved require '{required}' in {from}")]
    UnresolvedRequire { required: String, from: String },

    #[error("missing bundle source '{path}'")]
    MissingSource { path: String },

    #[error("bundled line {line} is {length} bytes, over the {limit}-byte cap")]
    LineTooLong {
        line: usize,
        length: usize,
        limit: usize,
    },

    #[error("runtime conflict: '{module}' uses {primitive}, but the entry script targets the github-script runtime")]
    RuntimeConflict { module: String, primitive: String },
}

pub type Result<T> = std::result::Result<T, Error>;
