//! The compilation core: from effective frontmatter to a `.lock.yml`.
//!
//! Takes the post-import frontmatter tree and Markdown body, derives the
//! trigger set, tool set, network allowlist, and safe-output plan, builds
//! the job graph, and serializes deterministic GitHub Actions YAML.

pub mod campaign;
pub mod compile;
pub mod emit;
pub mod engine;
pub mod error;
pub mod frontmatter;
pub mod jobs;
pub mod js;
pub mod network;
pub mod safe_outputs;
pub mod tools;
pub mod triggers;

pub use {
    compile::{CompiledFile, compile_source, lock_path, spec_id},
    error::{Error, Result},
    frontmatter::{EngineSpec, Frontmatter},
};
