//! The typed frontmatter model.
//!
//! Deserialized from the effective (post-import-merge) YAML tree. The
//! polymorphic fields keep their flexible shapes via untagged enums; the
//! `on` and `tools` trees stay as raw YAML values because dedicated modules
//! ([`crate::triggers`], [`crate::tools`]) interpret them.

use std::collections::BTreeMap;

use {
    serde::Deserialize,
    serde_yaml::Value,
};

use crate::error::{Error, Result};

/// Default agent job timeout when the spec sets none.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 20;

/// Engine selector: plain id or detailed configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EngineSpec {
    Id(String),
    Detailed {
        id: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        version: Option<String>,
        #[serde(default, rename = "max-turns")]
        max_turns: Option<u32>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
}

impl EngineSpec {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Detailed { id, .. } => id,
        }
    }

    #[must_use]
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Detailed { model, .. } => model.as_deref(),
        }
    }

    #[must_use]
    pub fn max_turns(&self) -> Option<u32> {
        match self {
            Self::Id(_) => None,
            Self::Detailed { max_turns, .. } => *max_turns,
        }
    }

    #[must_use]
    pub fn env(&self) -> BTreeMap<String, String> {
        match self {
            Self::Id(_) => BTreeMap::new(),
            Self::Detailed { env, .. } => env.clone(),
        }
    }
}

impl Default for EngineSpec {
    fn default() -> Self {
        Self::Id("copilot".to_string())
    }
}

/// `permissions:` — shorthand string or scope map.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Permissions {
    Shorthand(String),
    Scopes(BTreeMap<String, String>),
}

impl Default for Permissions {
    fn default() -> Self {
        Self::Scopes(BTreeMap::from([("contents".to_string(), "read".to_string())]))
    }
}

/// `network:` configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub firewall: Option<bool>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// Campaign `governance:` rate limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Governance {
    #[serde(default)]
    pub max_runs_per_hour: Option<u64>,
    #[serde(default)]
    pub max_comments_per_run: Option<u64>,
    #[serde(default)]
    pub max_dispatches_per_run: Option<u64>,
}

/// The whole frontmatter after import merging.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Frontmatter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub on: Option<Value>,
    #[serde(default)]
    pub engine: Option<EngineSpec>,
    #[serde(default)]
    pub permissions: Option<Permissions>,
    #[serde(default)]
    pub network: Option<NetworkConfig>,
    #[serde(default)]
    pub tools: BTreeMap<String, Value>,
    #[serde(default, rename = "safe-outputs")]
    pub safe_outputs: Option<Value>,
    #[serde(default)]
    pub steps: Vec<Value>,
    #[serde(default, rename = "timeout-minutes")]
    pub timeout_minutes: Option<u64>,
    #[serde(default, rename = "timeout_minutes")]
    pub timeout_minutes_alt: Option<u64>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub concurrency: Option<Value>,
    #[serde(default, rename = "runs-on")]
    pub runs_on: Option<Value>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, rename = "tracker-id")]
    pub tracker_id: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub governance: Option<Governance>,
}

impl Frontmatter {
    /// Deserialize from the effective YAML tree.
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_yaml::from_value(value.clone()).map_err(|e| Error::Frontmatter(e.to_string()))
    }

    /// Effective engine (copilot when unset).
    #[must_use]
    pub fn engine(&self) -> EngineSpec {
        self.engine.clone().unwrap_or_default()
    }

    /// Effective timeout; `timeout-minutes` wins over `timeout_minutes`.
    #[must_use]
    pub fn timeout_minutes(&self) -> u64 {
        self.timeout_minutes
            .or(self.timeout_minutes_alt)
            .unwrap_or(DEFAULT_TIMEOUT_MINUTES)
    }

    /// Workflow display name, defaulting to the spec id.
    #[must_use]
    pub fn display_name<'a>(&'a self, spec_id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(spec_id)
    }
}
