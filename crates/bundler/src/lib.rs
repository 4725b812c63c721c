//! Bundling of embedded runtime JavaScript.
//!
//! The compiler ships Node-runtime scripts (safe-output processing, log
//! parsing, threat detection, redaction) inside the emitted YAML. Those
//! scripts are authored as small `.cjs` modules with relative `require()`
//! calls; this crate inlines the require graph from an in-memory source
//! map into one self-contained script.
//!
//! The transformation is deliberately regex-driven: only plain
//! `require('./x')` forms are supported, which keeps the bundler honest
//! without a full JS parser.

pub mod bundle;
pub mod error;

pub use {
    bundle::{MAX_LINE_LENGTH, SourceMap, bundle},
    error::{Error, Result},
};
