//! Network allowlist resolution.
//!
//! `network.allowed` mixes literal domains with named bundles; bundles
//! expand to curated domain sets maintained here. The resolved list is the
//! deduplicated, sorted union.

use crate::frontmatter::NetworkConfig;

/// Known bundle names and their member domains.
pub const DOMAIN_BUNDLES: &[(&str, &[&str])] = &[
    (
        "containers",
        &[
            "*.docker.com",
            "*.docker.io",
            "ghcr.io",
            "mcr.microsoft.com",
            "production.cloudflare.docker.com",
            "quay.io",
            "registry-1.docker.io",
        ],
    ),
    (
        "defaults",
        &[
            "*.githubusercontent.com",
            "api.github.com",
            "codeload.github.com",
            "github.com",
            "objects.githubusercontent.com",
            "raw.githubusercontent.com",
            "uploads.github.com",
        ],
    ),
    (
        "dotnet",
        &["*.nuget.org", "api.nuget.org", "dotnetcli.azureedge.net"],
    ),
    (
        "github",
        &[
            "*.githubusercontent.com",
            "api.github.com",
            "github.com",
        ],
    ),
    (
        "go",
        &["gopkg.in", "proxy.golang.org", "storage.googleapis.com", "sum.golang.org"],
    ),
    (
        "java",
        &["jcenter.bintray.com", "repo.maven.apache.org", "repo1.maven.org"],
    ),
    (
        "node",
        &["*.npmjs.com", "*.npmjs.org", "nodejs.org", "registry.npmjs.org"],
    ),
    (
        "playwright",
        &["cdn.playwright.dev", "playwright.azureedge.net", "playwright.download.prss.microsoft.com"],
    ),
    (
        "python",
        &["*.pypi.org", "files.pythonhosted.org", "pypi.org", "pythonhosted.org"],
    ),
    (
        "rust",
        &["crates.io", "index.crates.io", "static.crates.io", "static.rust-lang.org"],
    ),
];

/// Look up one bundle's members.
#[must_use]
pub fn bundle(name: &str) -> Option<&'static [&'static str]> {
    DOMAIN_BUNDLES
        .iter()
        .find(|(bundle, _)| *bundle == name)
        .map(|(_, domains)| *domains)
}

/// Expand an allowed list (domains + bundle names) to the sorted,
/// deduplicated union of concrete domains.
#[must_use]
pub fn expand_allowed(allowed: &[String]) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for entry in allowed {
        match bundle(entry) {
            Some(members) => domains.extend(members.iter().map(ToString::to_string)),
            None => domains.push(entry.clone()),
        }
    }
    domains.sort();
    domains.dedup();
    domains
}

/// Resolve the workflow-level network allowlist.
///
/// An absent or empty `network:` means no egress restriction (no domain
/// list is emitted). A non-empty list always carries the `defaults` bundle.
#[must_use]
pub fn resolve(network: Option<&NetworkConfig>) -> Option<Vec<String>> {
    let network = network?;
    if network.allowed.is_empty() {
        return None;
    }
    let mut entries = network.allowed.clone();
    if !entries.iter().any(|e| e == "defaults") {
        entries.push("defaults".to_string());
    }
    Some(expand_allowed(&entries))
}
