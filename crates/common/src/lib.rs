//! Shared types and utilities used across all gh-aw crates.
//!
//! Deliberately small: each crate carries its own `thiserror` taxonomy, so
//! the only truly shared pieces are the diagnostic model every pipeline
//! phase reports through and the stable hash the code generator leans on.

pub mod diag;
pub mod hash;

pub use {
    diag::{Diagnostic, FileReport, Severity},
    hash::fnv1a64,
};
