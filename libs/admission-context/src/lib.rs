#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Request-scoped values produced by the admission pipeline.
//!
//! - [`TokenIdentity`] and [`CertIdentity`] are attached by the identifier layers
//! - [`ParsedBody`] is attached by the authorizer for body-bearing requests
//! - [`TlsConnectionInfo`] is attached by the transport for TLS connections
//!
//! Downstream handlers read them through [`RequestContextExt`] or through
//! `axum::Extension<T>` extractors.

pub mod body;
pub mod ext;
pub mod identity;
pub mod tls;

pub use body::ParsedBody;
pub use ext::RequestContextExt;
pub use identity::{CertIdentity, ClientCertificate, TokenIdentity};
pub use tls::TlsConnectionInfo;
