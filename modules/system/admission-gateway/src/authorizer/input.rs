//! Construction of the policy input document.
//!
//! Every function here is pure: it reads request parts and returns new
//! values without touching the request.

use std::collections::BTreeMap;

use admission_context::{CertIdentity, ClientCertificate};
use http::HeaderMap;
use http::request::Parts;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure decoding a path segment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid escape {escape:?} in segment {segment:?}")]
    InvalidEscape { segment: String, escape: String },

    #[error("segment {0:?} does not decode to UTF-8")]
    InvalidUtf8(String),
}

/// The document handed to the evaluator as `input`.
///
/// Maps are ordered so the serialized form is stable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputDocument {
    pub path: Vec<String>,
    pub method: String,
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificates: Option<Vec<ClientCertificate>>,
    pub headers: BTreeMap<String, Vec<String>>,
    pub params: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl InputDocument {
    /// Build the document for a request.
    ///
    /// `body` is the already decoded body, if the request had one.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] when the request path cannot be decoded.
    pub fn build(
        parts: &Parts,
        token: Option<&str>,
        certificates: Option<&CertIdentity>,
        body: Option<Value>,
    ) -> Result<Self, PathError> {
        Ok(Self {
            path: parse_path(parts.uri.path())?,
            method: parts.method.as_str().to_ascii_uppercase(),
            identity: select_identity(token, certificates).to_owned(),
            client_certificates: certificates.map(|c| c.certificates().to_vec()),
            headers: collect_headers(&parts.headers),
            params: parse_query(parts.uri.query()),
            body,
        })
    }

    /// JSON form passed to the evaluator.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Split a request path into decoded segments after dropping one leading
/// `/`. Only `""` and `"/"` give no segments.
///
/// # Errors
///
/// Returns [`PathError`] for a `%` not followed by two hex digits, or when a
/// decoded segment is not UTF-8.
pub fn parse_path(path: &str) -> Result<Vec<String>, PathError> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed.split('/').map(decode_segment).collect()
}

fn decode_segment(segment: &str) -> Result<String, PathError> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let mut byte = [0u8; 1];
            let decoded = bytes
                .get(i + 1..i + 3)
                .is_some_and(|pair| hex::decode_to_slice(pair, &mut byte).is_ok());
            if !decoded {
                let end = (i + 3).min(bytes.len());
                return Err(PathError::InvalidEscape {
                    segment: segment.to_owned(),
                    escape: String::from_utf8_lossy(&bytes[i..end]).into_owned(),
                });
            }
            out.push(byte[0]);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| PathError::InvalidUtf8(segment.to_owned()))
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}

/// Canonical MIME header form: the first letter and every letter after a
/// `-` upper-cased, the rest lower-cased. Names containing characters that
/// are not valid in a header token are returned unchanged.
#[must_use]
pub fn canonical_header_key(name: &str) -> String {
    if name.is_empty() || !name.bytes().all(is_token_byte) {
        return name.to_owned();
    }
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// Group header values by canonical name, keeping arrival order.
#[must_use]
pub fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        out.entry(canonical_header_key(name.as_str()))
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    out
}

/// Decode a query string into a multi-map. A malformed query gives an empty
/// map.
#[must_use]
pub fn parse_query(query: Option<&str>) -> BTreeMap<String, Vec<String>> {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return BTreeMap::new();
    };
    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => {
            let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (key, value) in pairs {
                out.entry(key).or_default().push(value);
            }
            out
        }
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed query string");
            BTreeMap::new()
        }
    }
}

/// The identity string for `input.identity`: the bearer token when present,
/// else the certificate subject, else empty.
#[must_use]
pub fn select_identity<'a>(token: Option<&'a str>, cert: Option<&'a CertIdentity>) -> &'a str {
    token
        .or_else(|| cert.map(CertIdentity::subject))
        .unwrap_or_default()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::{HeaderValue, Method, Request};
    use serde_json::json;

    fn cert_identity(subject: &str) -> CertIdentity {
        CertIdentity::from_leaves(vec![ClientCertificate {
            subject: subject.to_owned(),
            issuer: "CN=ca".to_owned(),
            serial_number: "7".to_owned(),
            not_before: "2024-01-01T00:00:00Z".to_owned(),
            not_after: "2034-01-01T00:00:00Z".to_owned(),
            dns_names: vec![],
            raw: String::new(),
        }])
        .unwrap()
    }

    #[test]
    fn path_segments() {
        assert!(parse_path("").unwrap().is_empty());
        assert!(parse_path("/").unwrap().is_empty());
        assert_eq!(parse_path("/foo/bar").unwrap(), vec!["foo", "bar"]);
        assert_eq!(parse_path("/a%20b/c%2Fd").unwrap(), vec!["a b", "c/d"]);
        assert_eq!(parse_path("/a//b/").unwrap(), vec!["a", "", "b", ""]);
        assert_eq!(parse_path("/caf%C3%A9").unwrap(), vec!["caf\u{e9}"]);
    }

    #[test]
    fn only_one_leading_slash_is_dropped() {
        assert_eq!(parse_path("//a").unwrap(), vec!["", "a"]);
        assert_eq!(parse_path("//").unwrap(), vec!["", ""]);
        assert_eq!(parse_path("a/b").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn path_round_trips_through_segments() {
        let segments = parse_path("/data/some/specific/document").unwrap();
        assert_eq!(format!("/{}", segments.join("/")), "/data/some/specific/document");
    }

    #[test]
    fn bad_escapes_fail() {
        assert!(matches!(
            parse_path("/invalid/path/foo%LALALA"),
            Err(PathError::InvalidEscape { ref escape, .. }) if escape == "%LA"
        ));
        assert!(parse_path("/trailing%").is_err());
        assert!(parse_path("/short%4").is_err());
        assert!(matches!(parse_path("/%ff"), Err(PathError::InvalidUtf8(_))));
    }

    #[test]
    fn header_keys_are_title_cased() {
        assert_eq!(canonical_header_key("x-custom"), "X-Custom");
        assert_eq!(canonical_header_key("X-CUSTOM-2"), "X-Custom-2");
        assert_eq!(canonical_header_key("content-type"), "Content-Type");
        assert_eq!(canonical_header_key("custom-header-3?"), "custom-header-3?");
        assert_eq!(canonical_header_key("has space"), "has space");
    }

    #[test]
    fn header_canonicalisation_is_idempotent() {
        for name in ["x-custom", "ACCEPT-encoding", "custom-header-3?", "a--b"] {
            let once = canonical_header_key(name);
            assert_eq!(canonical_header_key(&once), once);
        }
    }

    #[test]
    fn header_values_keep_order() {
        let mut headers = HeaderMap::new();
        headers.append("x-custom", HeaderValue::from_static("foo"));
        headers.append("X-custom", HeaderValue::from_static("bar"));
        headers.append("x-custom-2", HeaderValue::from_static("baz"));

        let collected = collect_headers(&headers);
        assert_eq!(collected["X-Custom"], vec!["foo", "bar"]);
        assert_eq!(collected["X-Custom-2"], vec!["baz"]);
    }

    #[test]
    fn query_params() {
        let params = parse_query(Some("pretty=true&explain=full&x=1&x=2&Case=k"));
        assert_eq!(params["pretty"], vec!["true"]);
        assert_eq!(params["x"], vec!["1", "2"]);
        assert_eq!(params["Case"], vec!["k"]);
        assert!(parse_query(None).is_empty());
        assert!(parse_query(Some("")).is_empty());
    }

    #[test]
    fn identity_preference() {
        let cert = cert_identity("CN=alice");
        assert_eq!(select_identity(Some("t0"), Some(&cert)), "t0");
        assert_eq!(select_identity(None, Some(&cert)), "CN=alice");
        assert_eq!(select_identity(None, None), "");
    }

    #[test]
    fn builds_document() {
        let (parts, ()) = Request::builder()
            .method(Method::GET)
            .uri("http://localhost:8181/foo/bar?pretty=true&explain=full")
            .header("x-custom", "foo")
            .header("X-custom", "bar")
            .header("x-custom-2", "baz")
            .body(())
            .unwrap()
            .into_parts();

        let doc = InputDocument::build(&parts, Some("bob"), None, None).unwrap();
        assert_eq!(
            doc.to_value(),
            json!({
                "path": ["foo", "bar"],
                "method": "GET",
                "identity": "bob",
                "headers": {"X-Custom": ["foo", "bar"], "X-Custom-2": ["baz"]},
                "params": {"explain": ["full"], "pretty": ["true"]}
            })
        );
    }

    #[test]
    fn certificates_and_body_are_included_when_present() {
        let (parts, ()) = Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(())
            .unwrap()
            .into_parts();
        let cert = cert_identity("CN=alice");

        let doc =
            InputDocument::build(&parts, None, Some(&cert), Some(json!({"foo": "bar"}))).unwrap();
        let value = doc.to_value();
        assert_eq!(value["identity"], json!("CN=alice"));
        assert_eq!(value["client_certificates"][0]["subject"], json!("CN=alice"));
        assert_eq!(value["body"], json!({"foo": "bar"}));
        assert_eq!(value["path"], json!([]));
    }
}
