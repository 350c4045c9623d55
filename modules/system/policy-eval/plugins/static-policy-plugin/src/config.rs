//! Configuration for the static policy plugin.

use std::collections::BTreeMap;

use policy_eval_sdk::DecisionRef;
use serde::{Deserialize, Serialize};

fn default_tokens_path() -> Vec<String> {
    vec!["system".to_owned(), "tokens".to_owned()]
}

fn default_roles() -> BTreeMap<String, Vec<Right>> {
    BTreeMap::from([(
        "admin".to_owned(),
        vec![Right {
            path: PathRule::Pattern("*".to_owned()),
            access: vec![Access::Read, Access::Write],
        }],
    )])
}

/// Plugin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticPolicyConfig {
    /// Decision this policy answers. Other references are undefined.
    pub decision: DecisionRef,

    /// Return `{"allowed", "reason"}` objects instead of booleans.
    pub report_reasons: bool,

    /// Location of the token table inside the data document.
    pub tokens_path: Vec<String>,

    /// Rights granted per role.
    pub roles: BTreeMap<String, Vec<Right>>,
}

impl Default for StaticPolicyConfig {
    fn default() -> Self {
        Self {
            decision: DecisionRef::default(),
            report_reasons: false,
            tokens_path: default_tokens_path(),
            roles: default_roles(),
        }
    }
}

/// Kind of access a method needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
}

impl Access {
    /// Access required by an upper-case HTTP method; `None` for methods no
    /// right can grant.
    #[must_use]
    pub fn for_method(method: &str) -> Option<Self> {
        match method {
            "GET" | "HEAD" => Some(Self::Read),
            "POST" | "PUT" | "PATCH" | "DELETE" => Some(Self::Write),
            _ => None,
        }
    }
}

/// Paths a right applies to.
///
/// - `"*"` matches every path
/// - `"/data/*/doc"` is split on `/`; a `*` segment matches any one segment
/// - `["data", "x"]` matches exactly those segments
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PathRule {
    Pattern(String),
    Segments(Vec<String>),
}

impl PathRule {
    #[must_use]
    pub fn matches(&self, path: &[&str]) -> bool {
        match self {
            Self::Pattern(p) if p == "*" => true,
            Self::Pattern(p) => {
                let trimmed = p.strip_prefix('/').unwrap_or(p);
                let pattern: Vec<&str> = if trimmed.is_empty() {
                    Vec::new()
                } else {
                    trimmed.split('/').collect()
                };
                pattern.len() == path.len()
                    && pattern
                        .iter()
                        .zip(path)
                        .all(|(want, got)| *want == "*" || want == got)
            }
            Self::Segments(segments) => {
                segments.len() == path.len() && segments.iter().zip(path).all(|(a, b)| a == b)
            }
        }
    }
}

/// A right held by a role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Right {
    pub path: PathRule,
    pub access: Vec<Access>,
}
