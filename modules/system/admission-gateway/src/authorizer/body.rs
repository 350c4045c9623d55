//! Request body reading and decoding for body-eligible requests.

use std::sync::Arc;

use axum::body::Body;
use bytes::Bytes;
use http::{HeaderMap, Method, header};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("failed to read body: {0}")]
    Read(String),

    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed YAML body: {0}")]
    Yaml(String),
}

/// Only `POST` requests have their body read.
#[must_use]
pub fn is_body_eligible(method: &Method) -> bool {
    method == Method::POST
}

/// Marks an extra route whose body is read, given the method and the decoded
/// path segments.
pub type BodyPathMatcher = Arc<dyn Fn(&Method, &[String]) -> bool + Send + Sync>;

/// `POST` requests, plus any request one of `extra` matches.
#[must_use]
pub fn expects_body(method: &Method, path: &[String], extra: &[BodyPathMatcher]) -> bool {
    is_body_eligible(method) || extra.iter().any(|matches| matches(method, path))
}

/// Whether the declared content type selects the YAML decoder.
#[must_use]
pub fn is_yaml(headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(
        essence.as_str(),
        "application/x-yaml" | "application/yaml" | "text/yaml"
    ) || essence.ends_with("+yaml")
}

/// Read the whole body, failing once more than `limit` bytes arrive.
///
/// # Errors
///
/// `TooLarge` past the limit, `Read` when the stream fails.
pub async fn read_limited(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(BodyError::TooLarge(limit)),
        Err(e) => Err(BodyError::Read(e.to_string())),
    }
}

/// Decode body bytes. Empty bodies decode to `None`.
///
/// # Errors
///
/// `Json` or `Yaml` when the bytes do not parse.
pub fn decode(bytes: &[u8], yaml: bool) -> Result<Option<Value>, BodyError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    if yaml {
        let text = std::str::from_utf8(bytes).map_err(|e| BodyError::Yaml(e.to_string()))?;
        let value: Value =
            serde_saphyr::from_str(text).map_err(|e| BodyError::Yaml(e.to_string()))?;
        return Ok(Some(value));
    }
    Ok(Some(serde_json::from_slice(bytes)?))
}
