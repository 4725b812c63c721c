//! Import resolution for workflow specs.
//!
//! Handles frontmatter `imports:` lists and inline `{{#import}}` directives,
//! for both local paths (with globs) and remote `owner/repo/path@ref`
//! references. Remote content is fetched through the GitHub contents API,
//! cached on disk by blob SHA, and deduplicated in-process with a
//! single-flight memo. Cycles are reported with their full chain.

pub mod cache;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod reference;
pub mod resolver;

pub use {
    error::{Error, Result},
    fetch::{Fetcher, GithubFetcher, StaticFetcher},
    reference::ImportRef,
    resolver::{ResolvedSpec, Resolver},
};
