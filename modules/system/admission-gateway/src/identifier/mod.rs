//! Identity extraction layers.
//!
//! Identifiers never reject a request: they attach what they can find to the
//! request extensions and always call the inner service.

pub mod tls;
pub mod token;

pub use tls::{TlsIdentifierLayer, TlsIdentifierService};
pub use token::{TokenIdentifierLayer, TokenIdentifierService};
