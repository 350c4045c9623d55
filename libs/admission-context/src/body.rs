use std::sync::Arc;

use serde_json::Value;

/// Decoded request body cached on the request by the authorizer.
///
/// Handlers read it instead of parsing the HTTP body a second time. The value
/// is shared with the input document that was handed to the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(Arc<Value>);

impl ParsedBody {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn shared(&self) -> Arc<Value> {
        Arc::clone(&self.0)
    }
}

impl From<Value> for ParsedBody {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
