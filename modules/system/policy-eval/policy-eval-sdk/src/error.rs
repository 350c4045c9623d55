//! Error types for policy evaluation and data access.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while evaluating a decision.
///
/// A negative decision is not an error: denial is expressed through
/// [`crate::Decision`]. These variants cover evaluation that could not
/// produce a decision at all.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The request was cancelled (client went away or the server is stopping).
    #[error("evaluation cancelled")]
    Cancelled,

    /// Evaluation exceeded its deadline.
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),

    /// The policy itself failed (conflicts, type errors, builtin failures).
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// An unexpected failure inside the evaluator.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised by a [`crate::DataStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A consistent snapshot could not be obtained.
    #[error("snapshot unavailable: {0}")]
    Unavailable(String),

    /// A write addressed a location below a non-object value.
    #[error("cannot write below non-object value at '{path}'")]
    NotAnObject { path: String },

    /// The document root must stay an object.
    #[error("data root must be an object")]
    InvalidRoot,
}

/// Errors raised while parsing a decision reference.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecisionRefError {
    #[error("decision reference is empty")]
    Empty,

    #[error("decision reference '{0}' must start with 'data'")]
    NotData(String),

    #[error("decision reference '{0}' contains an empty segment")]
    EmptySegment(String),
}
