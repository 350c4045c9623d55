//! Typed accessors over `http::Extensions`.
//!
//! Identifiers and the authorizer publish their results through the request
//! extensions; every kind is written at most once by the layer that owns it.

use http::Extensions;
use serde_json::Value;

use crate::body::ParsedBody;
use crate::identity::{CertIdentity, ClientCertificate, TokenIdentity};
use crate::tls::TlsConnectionInfo;

/// Read and set-once access to admission values on request extensions.
pub trait RequestContextExt {
    /// Bearer token identity, if the token identifier attached one.
    fn identity(&self) -> Option<&str>;

    /// Certificate identity, if the TLS identifier attached one.
    fn cert_identity(&self) -> Option<&CertIdentity>;

    /// Verified client certificates, if a certificate identity is present.
    fn client_certificates(&self) -> Option<&[ClientCertificate]>;

    /// Body decoded by the authorizer, if one was parsed.
    fn parsed_body(&self) -> Option<&Value>;

    /// TLS state published by the transport.
    fn tls_info(&self) -> Option<&TlsConnectionInfo>;

    /// Attach a token identity. Returns `false` and keeps the existing value
    /// when one is already present.
    fn set_token_identity(&mut self, identity: TokenIdentity) -> bool;

    /// Attach a certificate identity. Same set-once rule as tokens.
    fn set_cert_identity(&mut self, identity: CertIdentity) -> bool;

    /// Cache a parsed body. Same set-once rule as identities.
    fn set_parsed_body(&mut self, body: ParsedBody) -> bool;
}

fn insert_once<T: Clone + Send + Sync + 'static>(ext: &mut Extensions, value: T) -> bool {
    if ext.get::<T>().is_some() {
        return false;
    }
    ext.insert(value);
    true
}

impl RequestContextExt for Extensions {
    fn identity(&self) -> Option<&str> {
        self.get::<TokenIdentity>().map(TokenIdentity::token)
    }

    fn cert_identity(&self) -> Option<&CertIdentity> {
        self.get::<CertIdentity>()
    }

    fn client_certificates(&self) -> Option<&[ClientCertificate]> {
        self.get::<CertIdentity>().map(CertIdentity::certificates)
    }

    fn parsed_body(&self) -> Option<&Value> {
        self.get::<ParsedBody>().map(ParsedBody::value)
    }

    fn tls_info(&self) -> Option<&TlsConnectionInfo> {
        self.get::<TlsConnectionInfo>()
    }

    fn set_token_identity(&mut self, identity: TokenIdentity) -> bool {
        insert_once(self, identity)
    }

    fn set_cert_identity(&mut self, identity: CertIdentity) -> bool {
        insert_once(self, identity)
    }

    fn set_parsed_body(&mut self, body: ParsedBody) -> bool {
        insert_once(self, body)
    }
}
