//! GitHub token plumbing and expression hiding.

use std::sync::LazyLock;

use regex::Regex;

/// The three-level token fallback used everywhere a GitHub token is needed.
pub const GITHUB_TOKEN_CASCADE: &str =
    "${{ secrets.GH_AW_GITHUB_MCP_SERVER_TOKEN || secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}";

static EXPRESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\$\{\{[^}]*\}\}").expect("actions expression regex")
});

/// Result of extracting `${{ … }}` expressions out of shell-facing strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HiddenExpressions {
    /// The inputs with each expression replaced by `$GH_AW_EXPR_<n>`.
    pub rewritten: Vec<String>,
    /// `(GH_AW_EXPR_<n>, original expression)` pairs for the step `env:`.
    pub env: Vec<(String, String)>,
}

/// Extract every `${{ … }}` expression from `values`, replacing each with a
/// numbered environment variable reference.
///
/// Expressions evaluated by the runner can contain secrets; moving them
/// into `env:` keeps them out of the rendered command line and therefore
/// out of step logs. Identical expressions share one variable.
#[must_use]
pub fn hide_expressions(values: &[String]) -> HiddenExpressions {
    let mut hidden = HiddenExpressions::default();
    for value in values {
        let rewritten = EXPRESSION_RE.replace_all(value, |captures: &regex::Captures<'_>| {
            let expression = captures[0].to_string();
            let index = match hidden.env.iter().position(|(_, e)| *e == expression) {
                Some(i) => i,
                None => {
                    hidden
                        .env
                        .push((format!("GH_AW_EXPR_{}", hidden.env.len()), expression.clone()));
                    hidden.env.len() - 1
                },
            };
            format!("$GH_AW_EXPR_{index}")
        });
        hidden.rewritten.push(rewritten.into_owned());
    }
    hidden
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn plain_args_untouched() {
        let hidden = hide_expressions(&strings(&["run", "--flag"]));
        assert_eq!(hidden.rewritten, strings(&["run", "--flag"]));
        assert!(hidden.env.is_empty());
    }

    #[test]
    fn expression_replaced_and_enumerated() {
        let hidden = hide_expressions(&strings(&[
            "--token",
            "${{ secrets.GITHUB_TOKEN }}",
            "--repo",
            "${{ github.repository }}",
        ]));
        assert_eq!(
            hidden.rewritten,
            strings(&["--token", "$GH_AW_EXPR_0", "--repo", "$GH_AW_EXPR_1"])
        );
        assert_eq!(hidden.env[0].0, "GH_AW_EXPR_0");
        assert_eq!(hidden.env[0].1, "${{ secrets.GITHUB_TOKEN }}");
        assert_eq!(hidden.env[1].1, "${{ github.repository }}");
    }

    #[test]
    fn repeated_expression_shares_variable() {
        let hidden = hide_expressions(&strings(&[
            "${{ secrets.GITHUB_TOKEN }}",
            "again: ${{ secrets.GITHUB_TOKEN }}",
        ]));
        assert_eq!(hidden.env.len(), 1);
        assert_eq!(hidden.rewritten[1], "again: $GH_AW_EXPR_0");
    }

    #[test]
    fn embedded_expression_rewritten_in_place() {
        let hidden = hide_expressions(&strings(&["Bearer ${{ secrets.API_KEY }}"]));
        assert_eq!(hidden.rewritten[0], "Bearer $GH_AW_EXPR_0");
    }

    #[test]
    fn cascade_is_a_single_expression() {
        let hidden = hide_expressions(&strings(&[GITHUB_TOKEN_CASCADE]));
        assert_eq!(hidden.rewritten[0], "$GH_AW_EXPR_0");
        assert_eq!(hidden.env[0].1, GITHUB_TOKEN_CASCADE);
    }
}
