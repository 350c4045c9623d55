#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Admission Gateway
//!
//! Tower layers that decide whether an HTTP request reaches its handler:
//!
//! - [`TokenIdentifierLayer`] - attaches the bearer token identity
//! - [`TlsIdentifierLayer`] - attaches the verified client certificate identity
//! - [`AuthorizerLayer`] - builds the policy input, evaluates the decision and
//!   admits or rejects
//! - [`AdmissionPipeline`] - composes the three onto an `axum::Router`
//!
//! ## Usage
//!
//! ```ignore
//! use admission_gateway::{AdmissionPipeline, AuthorizerLayer, AuthorizerOptions};
//!
//! let authorizer = AuthorizerLayer::new(evaluator, store, AuthorizerOptions::default());
//! let app = AdmissionPipeline::new(authorizer).apply(router);
//! ```
//!
//! Handlers read the results through `admission_context::RequestContextExt`
//! or `axum::Extension<ParsedBody>`.

pub mod authorizer;
pub mod config;
pub mod error;
pub mod identifier;
pub mod pipeline;

pub use authorizer::body::BodyPathMatcher;
pub use authorizer::input::{InputDocument, PathError};
pub use authorizer::{AuthorizerLayer, AuthorizerOptions, AuthorizerService};
pub use config::AuthorizerConfig;
pub use error::{AdmissionError, ErrorV1};
pub use identifier::{TlsIdentifierLayer, TokenIdentifierLayer};
pub use pipeline::AdmissionPipeline;
