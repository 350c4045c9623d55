//! Domain models for policy evaluation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cache::{InterQueryCache, InterQueryValueCache};
use crate::error::DecisionRefError;
use crate::print::PrintSink;

/// Decision queried when none is configured.
pub const DEFAULT_DECISION: &str = "data.system.authz.allow";

/// Symbolic path into the policy naming the value to compute,
/// e.g. `data.system.authz.allow`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DecisionRef {
    segments: Vec<String>,
}

impl DecisionRef {
    /// Segments below `data`.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.segments[1..]
    }

    /// All segments including the leading `data`.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl Default for DecisionRef {
    fn default() -> Self {
        Self {
            segments: DEFAULT_DECISION.split('.').map(str::to_owned).collect(),
        }
    }
}

impl FromStr for DecisionRef {
    type Err = DecisionRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DecisionRefError::Empty);
        }
        let segments: Vec<String> = s.split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(DecisionRefError::EmptySegment(s.to_owned()));
        }
        if segments[0] != "data" {
            return Err(DecisionRefError::NotData(s.to_owned()));
        }
        Ok(Self { segments })
    }
}

impl TryFrom<String> for DecisionRef {
    type Error = DecisionRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DecisionRef> for String {
    fn from(value: DecisionRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DecisionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// A verdict returned by the evaluator, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The decision is a plain boolean.
    AllowBool(bool),
    /// The decision is an object with a boolean `allowed` member.
    /// `reason` is kept only when it is a string.
    AllowObject {
        allowed: bool,
        reason: Option<String>,
    },
    /// Any other shape.
    Other(Value),
}

impl Decision {
    /// Classify a raw evaluator result.
    #[must_use]
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Bool(allowed) => Self::AllowBool(allowed),
            Value::Object(ref obj) => match obj.get("allowed") {
                Some(Value::Bool(allowed)) => Self::AllowObject {
                    allowed: *allowed,
                    reason: obj
                        .get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                },
                _ => Self::Other(value),
            },
            other => Self::Other(other),
        }
    }

    /// Whether the request is admitted. `Other` never admits.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(
            self,
            Self::AllowBool(true) | Self::AllowObject { allowed: true, .. }
        )
    }
}

impl From<Value> for Decision {
    fn from(value: Value) -> Self {
        Self::classify(value)
    }
}

/// Per-request evaluation context.
///
/// Carries the request's cancellation token and the capabilities the
/// evaluator may use: runtime information, the print sink (only when printing
/// is enabled) and the shared inter-query caches. The caller never inspects
/// the caches.
#[derive(Clone, Default)]
pub struct EvalContext {
    cancellation: CancellationToken,
    runtime: Option<Arc<Value>>,
    print: Option<Arc<dyn PrintSink>>,
    inter_query_cache: Option<Arc<InterQueryCache>>,
    inter_query_value_cache: Option<Arc<InterQueryValueCache>>,
}

impl EvalContext {
    #[must_use]
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_runtime(mut self, runtime: Option<Arc<Value>>) -> Self {
        self.runtime = runtime;
        self
    }

    #[must_use]
    pub fn with_print_sink(mut self, sink: Option<Arc<dyn PrintSink>>) -> Self {
        self.print = sink;
        self
    }

    #[must_use]
    pub fn with_inter_query_cache(mut self, cache: Option<Arc<InterQueryCache>>) -> Self {
        self.inter_query_cache = cache;
        self
    }

    #[must_use]
    pub fn with_inter_query_value_cache(
        mut self,
        cache: Option<Arc<InterQueryValueCache>>,
    ) -> Self {
        self.inter_query_value_cache = cache;
        self
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    #[must_use]
    pub fn runtime(&self) -> Option<&Value> {
        self.runtime.as_deref()
    }

    #[must_use]
    pub fn print_enabled(&self) -> bool {
        self.print.is_some()
    }

    /// Emit a diagnostic print; dropped when printing is disabled.
    pub fn print(&self, message: &str) {
        if let Some(sink) = &self.print {
            sink.print(message);
        }
    }

    #[must_use]
    pub fn inter_query_cache(&self) -> Option<&Arc<InterQueryCache>> {
        self.inter_query_cache.as_ref()
    }

    #[must_use]
    pub fn inter_query_value_cache(&self) -> Option<&Arc<InterQueryValueCache>> {
        self.inter_query_value_cache.as_ref()
    }
}

impl fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("runtime", &self.runtime)
            .field("print_enabled", &self.print.is_some())
            .field("inter_query_cache", &self.inter_query_cache.is_some())
            .field(
                "inter_query_value_cache",
                &self.inter_query_value_cache.is_some(),
            )
            .finish()
    }
}
