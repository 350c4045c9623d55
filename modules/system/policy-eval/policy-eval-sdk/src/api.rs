//! Evaluator contract consumed by the admission pipeline.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EvalError;
use crate::models::{DecisionRef, EvalContext};
use crate::store::DataSnapshot;

/// A policy evaluator.
///
/// The authorizer calls it once per request with the input document and a
/// snapshot taken for that request:
///
/// ```ignore
/// let snapshot = store.snapshot()?;
/// let result = evaluator.evaluate(&ctx, &decision, &input, &snapshot).await?;
/// ```
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluate `decision` against `input` and `data`.
    ///
    /// Returns `Ok(None)` when the decision is undefined.
    ///
    /// # Errors
    ///
    /// - `Cancelled` when `ctx` is cancelled before a result is produced
    /// - `Evaluation` when the policy fails
    /// - `Internal` for unexpected failures
    async fn evaluate(
        &self,
        ctx: &EvalContext,
        decision: &DecisionRef,
        input: &Value,
        data: &DataSnapshot,
    ) -> Result<Option<Value>, EvalError>;
}
