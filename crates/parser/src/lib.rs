//! Source-file parsing for agentic workflow specs.
//!
//! Splits Markdown files into YAML frontmatter and body, validates the
//! frontmatter against the main/included schemas, applies the custom
//! trigger/engine/strict rules, and scans the Markdown body for template
//! directives (`{{#import}}`, `{{#if}}`).

pub mod error;
pub mod rules;
pub mod schema;
pub mod split;
pub mod template;

pub use {
    error::{Error, Result},
    schema::{SchemaKind, validate_frontmatter},
    split::{SplitSpec, split_source},
    template::{ConditionalRegion, ImportDirective, scan_conditionals, scan_imports},
};
