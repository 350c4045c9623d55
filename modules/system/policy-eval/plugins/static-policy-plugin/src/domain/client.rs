//! [`PolicyEvaluator`] implementation for the static policy plugin.

use async_trait::async_trait;
use policy_eval_sdk::{DataSnapshot, DecisionRef, EvalContext, EvalError, PolicyEvaluator};
use serde_json::Value;

use super::service::Service;
use crate::config::StaticPolicyConfig;

/// Evaluator answering a single decision from a static role table.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicyEvaluator {
    service: Service,
}

impl StaticPolicyEvaluator {
    #[must_use]
    pub fn new(config: StaticPolicyConfig) -> Self {
        Self {
            service: Service::new(config),
        }
    }
}

#[async_trait]
impl PolicyEvaluator for StaticPolicyEvaluator {
    async fn evaluate(
        &self,
        ctx: &EvalContext,
        decision: &DecisionRef,
        input: &Value,
        data: &DataSnapshot,
    ) -> Result<Option<Value>, EvalError> {
        if ctx.is_cancelled() {
            return Err(EvalError::Cancelled);
        }
        if *decision != self.service.config().decision {
            tracing::debug!(decision = %decision, "Decision not defined by static policy");
            return Ok(None);
        }
        if !input.is_object() {
            return Err(EvalError::Evaluation(
                "input document must be an object".to_owned(),
            ));
        }
        Ok(Some(self.service.evaluate(ctx, input, data)))
    }
}
