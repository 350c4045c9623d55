//! Rule evaluation for the static policy plugin.

use policy_eval_sdk::{DataSnapshot, EvalContext};
use serde_json::{Value, json};

use crate::config::{Access, Right, StaticPolicyConfig};

/// Outcome of one evaluation before it is shaped into a decision value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: Option<String>,
}

/// Static token/role policy.
#[derive(Debug, Clone, Default)]
pub struct Service {
    config: StaticPolicyConfig,
}

impl Service {
    #[must_use]
    pub fn new(config: StaticPolicyConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &StaticPolicyConfig {
        &self.config
    }

    /// Decide `input` against `data`.
    #[must_use]
    pub fn decide(&self, input: &Value, data: &DataSnapshot) -> Verdict {
        let identity = input.get("identity").and_then(Value::as_str).unwrap_or("");
        let method = input.get("method").and_then(Value::as_str).unwrap_or("");
        let path: Vec<&str> = input
            .get("path")
            .and_then(Value::as_array)
            .map(|segments| segments.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        if identity.is_empty() {
            return deny("missing identity");
        }

        let roles = self.roles_of(identity, data);
        if roles.is_empty() {
            return deny("unknown identity");
        }

        let Some(access) = Access::for_method(method) else {
            return deny(&format!("method {method} is not permitted"));
        };

        let granted = roles
            .iter()
            .filter_map(|role| self.config.roles.get(*role))
            .flatten()
            .any(|right: &Right| right.access.contains(&access) && right.path.matches(&path));

        if granted {
            Verdict {
                allowed: true,
                reason: None,
            }
        } else {
            deny(&format!("no right grants {method} /{}", path.join("/")))
        }
    }

    /// Evaluate and shape the verdict per configuration.
    #[must_use]
    pub fn evaluate(&self, ctx: &EvalContext, input: &Value, data: &DataSnapshot) -> Value {
        let verdict = self.decide(input, data);
        ctx.print(&format!("allowed={}", verdict.allowed));

        if self.config.report_reasons {
            match verdict.reason {
                Some(reason) => json!({ "allowed": verdict.allowed, "reason": reason }),
                None => json!({ "allowed": verdict.allowed }),
            }
        } else {
            Value::Bool(verdict.allowed)
        }
    }

    fn roles_of<'a>(&self, identity: &str, data: &'a DataSnapshot) -> Vec<&'a str> {
        let mut path: Vec<&str> = self.config.tokens_path.iter().map(String::as_str).collect();
        path.push(identity);
        path.push("roles");
        data.get(&path)
            .and_then(Value::as_array)
            .map(|roles| roles.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

fn deny(reason: &str) -> Verdict {
    Verdict {
        allowed: false,
        reason: Some(reason.to_owned()),
    }
}
