//! Bearer token identifier.

use std::task::{Context, Poll};

use admission_context::{RequestContextExt, TokenIdentity};
use http::{HeaderMap, Request, header};
use tower::{Layer, Service};

const SCHEME: &str = "Bearer";

/// Extract the token from an `Authorization` value of the form
/// `Bearer <ws>+ <token>`, where the token has no whitespace.
#[must_use]
pub fn parse_bearer(value: &str) -> Option<&str> {
    let rest = value.strip_prefix(SCHEME)?;
    let token = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
    if token.len() == rest.len() || token.is_empty() {
        return None;
    }
    if token.contains(|c: char| c.is_ascii_whitespace()) {
        return None;
    }
    Some(token)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?;
    let value = std::str::from_utf8(value.as_bytes()).ok()?;
    parse_bearer(value)
}

/// Layer attaching a [`TokenIdentity`] for requests carrying a bearer token.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenIdentifierLayer;

impl TokenIdentifierLayer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TokenIdentifierLayer {
    type Service = TokenIdentifierService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TokenIdentifierService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct TokenIdentifierService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for TokenIdentifierService<S>
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
        let identity = bearer_token(request.headers()).and_then(TokenIdentity::new);
        match identity {
            Some(identity) => {
                if !request.extensions_mut().set_token_identity(identity) {
                    tracing::debug!("Token identity already present, keeping existing value");
                }
            }
            None => tracing::trace!("No bearer token on request"),
        }
        self.inner.call(request)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn accepts_bearer_tokens() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("Bearer \t  abc.def-ghi"), Some("abc.def-ghi"));
    }

    #[test]
    fn rejects_other_shapes() {
        for value in [
            "",
            "Bearer",
            "Bearer ",
            "Bearerabc",
            "bearer abc",
            "Basic abc",
            " Bearer abc",
            "Bearer abc ",
            "Bearer abc def",
        ] {
            assert_eq!(parse_bearer(value), None, "{value:?}");
        }
    }

    #[test]
    fn reads_authorization_header() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t0"));
        assert_eq!(bearer_token(&headers), Some("t0"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap(),
        );
        assert!(bearer_token(&headers).is_none());
    }
}
