use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// `TokenIdentity` carries the bearer token literal extracted from the
/// `Authorization` header.
///
/// The token is wrapped in `SecretString` so `Debug` output redacts it.
/// Construction rejects empty tokens: presence of the extension is the
/// presence flag, an empty identity is never attached.
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    token: SecretString,
}

impl TokenIdentity {
    /// Create a token identity, returning `None` for an empty token.
    #[must_use]
    pub fn new(token: &str) -> Option<Self> {
        if token.is_empty() {
            return None;
        }
        Some(Self {
            token: SecretString::from(token.to_owned()),
        })
    }

    /// The raw bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

/// A verified client certificate as exposed to policies.
///
/// Field names are part of the policy input contract and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCertificate {
    /// Subject distinguished name, RFC 2253.
    pub subject: String,
    /// Issuer distinguished name, RFC 2253.
    pub issuer: String,
    /// Serial number in decimal notation.
    pub serial_number: String,
    /// Validity start, RFC 3339.
    pub not_before: String,
    /// Validity end, RFC 3339.
    pub not_after: String,
    /// DNS names from the subject alternative name extension.
    #[serde(default)]
    pub dns_names: Vec<String>,
    /// Base64 (standard alphabet) of the DER encoding.
    pub raw: String,
}

/// `CertIdentity` is attached when the TLS layer verified at least one
/// client certificate chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertIdentity {
    subject: String,
    certificates: Vec<ClientCertificate>,
}

impl CertIdentity {
    /// Build from the ordered list of verified leaves (one per chain).
    ///
    /// The first leaf's subject becomes the identity string. Returns `None`
    /// for an empty list.
    #[must_use]
    pub fn from_leaves(certificates: Vec<ClientCertificate>) -> Option<Self> {
        let subject = certificates.first()?.subject.clone();
        Some(Self {
            subject,
            certificates,
        })
    }

    /// RFC 2253 subject of the first verified leaf.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Verified leaves in chain order.
    #[must_use]
    pub fn certificates(&self) -> &[ClientCertificate] {
        &self.certificates
    }
}
