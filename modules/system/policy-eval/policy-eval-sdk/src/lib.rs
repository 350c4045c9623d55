#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Policy evaluation SDK
//!
//! This crate provides the contract between the admission pipeline and a
//! policy evaluator:
//!
//! - [`PolicyEvaluator`] - evaluator trait called once per request
//! - [`DecisionRef`], [`Decision`] - what to evaluate and the classified verdict
//! - [`EvalContext`] - cancellation, runtime info, print sink, caches
//! - [`DataStore`], [`DataSnapshot`], [`InMemoryDataStore`] - policy data
//! - [`InterQueryCache`], [`InterQueryValueCache`] - cross-request caches
//! - [`EvalError`], [`StoreError`] - error types
//!
//! ## Usage
//!
//! ```ignore
//! use policy_eval_sdk::{Decision, DecisionRef, EvalContext, DataStore, PolicyEvaluator};
//!
//! let snapshot = store.snapshot()?;
//! let ctx = EvalContext::new(cancel.child_token());
//! let decision = evaluator
//!     .evaluate(&ctx, &DecisionRef::default(), &input, &snapshot)
//!     .await?
//!     .map(Decision::classify);
//! ```

pub mod api;
pub mod cache;
pub mod error;
pub mod models;
pub mod print;
pub mod store;

pub use api::PolicyEvaluator;
pub use cache::{InterQueryCache, InterQueryCacheConfig, InterQueryValueCache};
pub use error::{DecisionRefError, EvalError, StoreError};
pub use models::{DEFAULT_DECISION, Decision, DecisionRef, EvalContext};
pub use print::{PrintSink, TracingPrintSink};
pub use store::{DataSnapshot, DataStore, InMemoryDataStore};
