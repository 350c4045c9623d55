use std::sync::Arc;
use std::time::Duration;

use policy_eval_sdk::{DecisionRef, InterQueryCacheConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_body_limit_bytes() -> usize {
    16 * 1024 * 1024
}

/// Declarative authorizer settings.
///
/// Converted into [`crate::AuthorizerOptions`] with
/// [`crate::AuthorizerOptions::from_config`]; programmatic options such as a
/// custom print sink or a shutdown token are set on the options directly.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct AuthorizerConfig {
    /// Decision evaluated for every request.
    pub decision: DecisionRef,

    /// Forward policy print output to the tracing print sink.
    pub print_enabled: bool,

    /// Largest body read for body-eligible requests.
    pub body_limit_bytes: usize,

    /// Evaluation deadline in milliseconds. Unbounded when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_timeout_ms: Option<u64>,

    /// Runtime information handed to the evaluator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Value>,

    /// Enables both inter-query caches with the given sizing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inter_query_cache: Option<InterQueryCacheConfig>,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            decision: DecisionRef::default(),
            print_enabled: false,
            body_limit_bytes: default_body_limit_bytes(),
            eval_timeout_ms: None,
            runtime: None,
            inter_query_cache: None,
        }
    }
}

impl AuthorizerConfig {
    #[must_use]
    pub fn eval_timeout(&self) -> Option<Duration> {
        self.eval_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn runtime(&self) -> Option<Arc<Value>> {
        self.runtime.clone().map(Arc::new)
    }
}
