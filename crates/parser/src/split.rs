//! Frontmatter/body splitting with line tracking.
//!
//! A spec file optionally opens with a `---` fence on line 1; the closing
//! fence is the next line whose trimmed content is `---`. Everything between
//! the fences is YAML, everything after is the Markdown body.

use crate::error::{Error, Result};

/// The two halves of a source file, plus the line where the YAML starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitSpec {
    pub frontmatter: String,
    pub body: String,
    /// 1-based line number of the first frontmatter line (2 when a fence
    /// opens the file, 0 when there is no frontmatter at all).
    pub frontmatter_start_line: usize,
    /// 1-based line number of the first body line.
    pub body_start_line: usize,
}

/// Split raw file content into frontmatter and Markdown body.
///
/// Files without an opening fence have empty frontmatter and the whole
/// content as body. An opening fence without a closing fence is fatal.
pub fn split_source(content: &str, path: &str) -> Result<SplitSpec> {
    if content.contains('\0') {
        return Err(Error::Binary { path: path.into() });
    }

    let mut lines = content.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(SplitSpec {
            frontmatter: String::new(),
            body: String::new(),
            frontmatter_start_line: 0,
            body_start_line: 1,
        });
    };

    if first.trim_end() != "---" {
        return Ok(SplitSpec {
            frontmatter: String::new(),
            body: content.to_string(),
            frontmatter_start_line: 0,
            body_start_line: 1,
        });
    }

    let mut frontmatter = String::new();
    let mut closed = false;
    let mut body_offset = first.len();
    let mut fence_lines = 2;
    for line in lines {
        body_offset += line.len();
        if line.trim() == "---" {
            closed = true;
            break;
        }
        frontmatter.push_str(line);
        fence_lines += 1;
    }

    if !closed {
        return Err(Error::UnterminatedFrontmatter);
    }

    Ok(SplitSpec {
        frontmatter,
        body: content[body_offset..].to_string(),
        frontmatter_start_line: 2,
        body_start_line: fence_lines + 1,
    })
}

/// Parse frontmatter text into a YAML value, mapping syntax errors to
/// whole-file coordinates using the frontmatter start line.
pub fn parse_frontmatter(split: &SplitSpec) -> Result<serde_yaml::Value> {
    if split.frontmatter.trim().is_empty() {
        return Ok(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
    }
    serde_yaml::from_str(&split.frontmatter).map_err(|e| {
        let location = e.location();
        Error::Yaml {
            message: e.to_string(),
            line: location
                .as_ref()
                .map(|l| l.line() + split.frontmatter_start_line.saturating_sub(1)),
            column: location.as_ref().map(|l| l.column()),
        }
    })
}

/// Locate the line of a top-level (or nested, by last segment) frontmatter
/// key for approximate diagnostic positioning.
#[must_use]
pub fn line_of_key(split: &SplitSpec, dotted_path: &str) -> Option<usize> {
    let key = dotted_path.rsplit('.').next()?;
    let needle = format!("{key}:");
    for (idx, line) in split.frontmatter.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with(&needle)
            || trimmed.starts_with(&format!("\"{key}\":"))
            || trimmed.starts_with(&format!("'{key}':"))
        {
            return Some(idx + split.frontmatter_start_line);
        }
    }
    None
}
