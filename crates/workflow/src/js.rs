//! Embedded runtime scripts and their bundling.
//!
//! The `.cjs` sources ship inside the binary; the bundler inlines each
//! entry's require graph at compile time so the emitted YAML carries
//! self-contained scripts.

use ghaw_bundler::{SourceMap, bundle};

use crate::error::Result;

/// Entry script names, as referenced by job builders.
pub const SAFE_OUTPUTS_ENTRY: &str = "safe_outputs.cjs";
pub const THREAT_DETECTION_ENTRY: &str = "threat_detection.cjs";
pub const LOG_PARSER_ENTRY: &str = "log_parser.cjs";
pub const REDACT_ENTRY: &str = "redact.cjs";

/// All embedded sources, keyed by path.
#[must_use]
pub fn source_map() -> SourceMap {
    let mut sources = SourceMap::new();
    sources.insert("lib/jsonl.cjs", include_str!("../assets/js/lib/jsonl.cjs"));
    sources.insert(
        "lib/sanitize.cjs",
        include_str!("../assets/js/lib/sanitize.cjs"),
    );
    sources.insert(
        SAFE_OUTPUTS_ENTRY,
        include_str!("../assets/js/safe_outputs.cjs"),
    );
    sources.insert(
        THREAT_DETECTION_ENTRY,
        include_str!("../assets/js/threat_detection.cjs"),
    );
    sources.insert(LOG_PARSER_ENTRY, include_str!("../assets/js/log_parser.cjs"));
    sources.insert(REDACT_ENTRY, include_str!("../assets/js/redact.cjs"));
    sources
}

/// Bundle one entry script to its self-contained form.
pub fn bundled(entry: &str) -> Result<String> {
    Ok(bundle(entry, &source_map())?)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_entries_bundle() {
        for entry in [
            SAFE_OUTPUTS_ENTRY,
            THREAT_DETECTION_ENTRY,
            LOG_PARSER_ENTRY,
            REDACT_ENTRY,
        ] {
            let out = bundled(entry).unwrap();
            assert!(!out.contains("require(\"./"), "unbundled require in {entry}");
        }
    }

    #[test]
    fn shared_helpers_inlined() {
        let out = bundled(SAFE_OUTPUTS_ENTRY).unwrap();
        assert!(out.contains("function parseJsonl"));
        assert!(out.contains("function sanitizeBody"));
    }

    #[test]
    fn bundling_is_deterministic() {
        assert_eq!(bundled(SAFE_OUTPUTS_ENTRY).unwrap(), bundled(SAFE_OUTPUTS_ENTRY).unwrap());
    }
}
