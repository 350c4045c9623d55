#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Static Policy Plugin
//!
//! A [`policy_eval_sdk::PolicyEvaluator`] with a fixed token/role policy for
//! development and testing.
//!
//! Tokens are looked up in the data document (by default under
//! `data.system.tokens.<token>.roles`); each role grants rights on paths:
//!
//! ```yaml
//! policy:
//!   decision: data.system.authz.allow
//!   report_reasons: false
//!   roles:
//!     admin:
//!       - path: "*"
//!         access: [read, write]
//!     reader:
//!       - path: [data, x]
//!         access: [read]
//! ```
//!
//! `GET`/`HEAD` require `read`; `POST`/`PUT`/`PATCH`/`DELETE` require `write`.
//! Any other method is denied. The configured decision evaluates to a boolean,
//! or to `{"allowed": .., "reason": ..}` with `report_reasons`. Any other
//! decision reference is undefined.

pub mod config;
pub mod domain;

pub use config::{Access, PathRule, Right, StaticPolicyConfig};
pub use domain::StaticPolicyEvaluator;
