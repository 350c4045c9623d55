//! Client certificate identifier.
//!
//! The transport publishes a [`TlsConnectionInfo`] per connection. When the
//! handshake produced at least one verified chain, the leaf of each chain is
//! decoded and the first leaf's subject (RFC 2253) becomes the identity.

use std::task::{Context, Poll};

use admission_context::{CertIdentity, ClientCertificate, RequestContextExt, TlsConnectionInfo};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::Request;
use time::format_description::well_known::Rfc3339;
use tower::{Layer, Service};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate, X509Name};
use x509_parser::x509::AttributeTypeAndValue;

/// Short names rendered instead of dotted OIDs.
const SHORT_NAMES: &[(&str, &str)] = &[
    ("2.5.4.3", "CN"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("2.5.4.6", "C"),
    ("2.5.4.9", "STREET"),
    ("0.9.2342.19200300.100.1.25", "DC"),
    ("0.9.2342.19200300.100.1.1", "UID"),
];

fn short_name(oid: &str) -> Option<&'static str> {
    SHORT_NAMES
        .iter()
        .find_map(|(id, name)| (*id == oid).then_some(*name))
}

/// Escape an attribute value per RFC 2253 section 2.4.
fn escape_value(value: &str, out: &mut String) {
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && (c == ' ' || c == '#'))
            || (i == last && c == ' ');
        if needs_escape {
            out.push('\\');
        }
        out.push(c);
    }
}

/// DER encoding of an attribute value as `#hex`.
fn hex_value(atv: &AttributeTypeAndValue<'_>) -> String {
    let value = atv.attr_value();
    let mut der = Vec::with_capacity(value.data.len() + 6);
    let tag = u8::try_from(value.header.tag().0).unwrap_or(0x1f) & 0x1f;
    let constructed = if value.header.is_constructed() { 0x20 } else { 0 };
    der.push(tag | constructed);
    let len = value.data.len();
    if len < 0x80 {
        der.push(u8::try_from(len).unwrap_or(0));
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        der.push(0x80 | u8::try_from(bytes.len() - skip).unwrap_or(0));
        der.extend_from_slice(&bytes[skip..]);
    }
    der.extend_from_slice(value.data);
    format!("#{}", hex::encode(der))
}

fn write_attribute(atv: &AttributeTypeAndValue<'_>, out: &mut String) {
    let oid = atv.attr_type().to_id_string();
    match short_name(&oid) {
        Some(name) => out.push_str(name),
        None => out.push_str(&oid),
    }
    out.push('=');
    match (short_name(&oid), atv.as_str()) {
        (Some(_), Ok(s)) => escape_value(s, out),
        _ => out.push_str(&hex_value(atv)),
    }
}

/// Render a distinguished name per RFC 2253: RDNs last to first, joined by
/// `,`, with multi-valued RDNs joined by `+`.
#[must_use]
pub fn rfc2253(name: &X509Name<'_>) -> String {
    let rdns: Vec<_> = name.iter().collect();
    let mut out = String::new();
    for (i, rdn) in rdns.iter().rev().enumerate() {
        if i > 0 {
            out.push(',');
        }
        for (j, atv) in rdn.iter().enumerate() {
            if j > 0 {
                out.push('+');
            }
            write_attribute(atv, &mut out);
        }
    }
    out
}

fn dns_names(cert: &X509Certificate<'_>) -> Vec<String> {
    let Ok(Some(san)) = cert.subject_alternative_name() else {
        return Vec::new();
    };
    san.value
        .general_names
        .iter()
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some((*dns).to_owned()),
            _ => None,
        })
        .collect()
}

/// Decode a DER certificate into the record exposed to policies.
///
/// Returns `None` when the certificate cannot be parsed.
#[must_use]
pub fn describe_certificate(der: &[u8]) -> Option<ClientCertificate> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    let validity = cert.validity();

    Some(ClientCertificate {
        subject: rfc2253(cert.subject()),
        issuer: rfc2253(cert.issuer()),
        serial_number: cert.serial.to_string(),
        not_before: validity.not_before.to_datetime().format(&Rfc3339).ok()?,
        not_after: validity.not_after.to_datetime().format(&Rfc3339).ok()?,
        dns_names: dns_names(&cert),
        raw: STANDARD.encode(der),
    })
}

/// Identity for a connection; `None` without a verified chain or when a
/// verified leaf cannot be decoded.
#[must_use]
pub fn identify(info: &TlsConnectionInfo) -> Option<CertIdentity> {
    if info.verified_chains().is_empty() {
        if !info.peer_certificates().is_empty() {
            tracing::debug!("Client certificate presented without a verified chain");
        }
        return None;
    }

    let mut leaves = Vec::with_capacity(info.verified_chains().len());
    for leaf in info.verified_leaves() {
        let Some(cert) = describe_certificate(leaf.as_ref()) else {
            tracing::debug!("Verified client certificate could not be decoded");
            return None;
        };
        leaves.push(cert);
    }
    CertIdentity::from_leaves(leaves)
}

/// Layer attaching a [`CertIdentity`] for connections with a verified client
/// certificate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsIdentifierLayer;

impl TlsIdentifierLayer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TlsIdentifierLayer {
    type Service = TlsIdentifierService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TlsIdentifierService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct TlsIdentifierService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for TlsIdentifierService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let identity = request.extensions().tls_info().and_then(identify);
        if let Some(identity) = identity {
            tracing::debug!(subject = %identity.subject(), "Client certificate identity attached");
            request.extensions_mut().set_cert_identity(identity);
        }
        self.inner.call(request)
    }
}
