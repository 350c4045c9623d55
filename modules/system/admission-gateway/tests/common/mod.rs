#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

//! Shared fixtures for admission gateway integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use admission_context::RequestContextExt;
use admission_gateway::{AdmissionPipeline, AuthorizerLayer, AuthorizerOptions};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use policy_eval_sdk::{
    DataSnapshot, DecisionRef, EvalContext, EvalError, InMemoryDataStore, PolicyEvaluator,
};
use serde_json::{Value, json};
use static_policy_plugin::{Access, PathRule, Right, StaticPolicyConfig, StaticPolicyEvaluator};
use tower::ServiceExt;

/// Token table: `admin` may do anything, `reader` may only read `/data/x`.
pub fn data_store() -> Arc<InMemoryDataStore> {
    Arc::new(
        InMemoryDataStore::from_value(json!({
            "system": {"tokens": {
                "admin": {"roles": ["admin"]},
                "reader": {"roles": ["reader"]}
            }}
        }))
        .unwrap(),
    )
}

pub fn static_policy() -> StaticPolicyConfig {
    StaticPolicyConfig {
        roles: BTreeMap::from([
            (
                "admin".to_owned(),
                vec![Right {
                    path: PathRule::Pattern("*".to_owned()),
                    access: vec![Access::Read, Access::Write],
                }],
            ),
            (
                "reader".to_owned(),
                vec![Right {
                    path: PathRule::Segments(vec!["data".to_owned(), "x".to_owned()]),
                    access: vec![Access::Read],
                }],
            ),
        ]),
        ..StaticPolicyConfig::default()
    }
}

/// Static policy with a few scripted paths and a record of every input.
///
/// - `/undefined` has no decision
/// - `/conflict_error` fails evaluation
/// - `/reason` denies with `"custom reason"`
/// - `/reason/wrong_type` denies with a non-string reason
/// - `/reason/wrong_object` returns an object without `allowed`
#[derive(Default)]
pub struct ScriptedEvaluator {
    fallback: StaticPolicyEvaluator,
    pub inputs: Mutex<Vec<Value>>,
    pub calls: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self {
            fallback: StaticPolicyEvaluator::new(static_policy()),
            ..Self::default()
        }
    }

    pub fn last_input(&self) -> Value {
        self.inputs.lock().last().cloned().unwrap_or(Value::Null)
    }
}

#[async_trait]
impl PolicyEvaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        ctx: &EvalContext,
        decision: &DecisionRef,
        input: &Value,
        data: &DataSnapshot,
    ) -> Result<Option<Value>, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().push(input.clone());

        let path: Vec<&str> = input["path"]
            .as_array()
            .map(|p| p.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        match path.as_slice() {
            ["undefined", ..] => Ok(None),
            ["conflict_error", ..] => Err(EvalError::Evaluation(
                "complete rules must not produce multiple outputs".to_owned(),
            )),
            ["reason"] => Ok(Some(json!({"allowed": false, "reason": "custom reason"}))),
            ["reason", "wrong_type"] => Ok(Some(json!({"allowed": false, "reason": 0}))),
            ["reason", "wrong_object"] => Ok(Some(json!({"foo": "bar"}))),
            _ => self.fallback.evaluate(ctx, decision, input, data).await,
        }
    }
}

/// Number of times the inner handler ran.
#[derive(Clone, Default)]
pub struct HandlerCalls(pub Arc<AtomicUsize>);

impl HandlerCalls {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Inner handler reporting what it received.
async fn echo(calls: HandlerCalls, request: Request) -> Response {
    calls.0.fetch_add(1, Ordering::SeqCst);
    let (parts, body) = request.into_parts();
    let ext = &parts.extensions;
    let report = json!({
        "method": parts.method.as_str(),
        "identity": ext.identity(),
        "cert_subject": ext.cert_identity().map(|c| c.subject().to_owned()),
        "cert_count": ext.client_certificates().map_or(0, <[_]>::len),
        "parsed_body": ext.parsed_body().cloned(),
    });
    let bytes = body.collect().await.unwrap().to_bytes();
    let mut report = report;
    report["raw_body"] = Value::String(String::from_utf8_lossy(&bytes).into_owned());
    (StatusCode::OK, axum::Json(report)).into_response()
}

pub fn echo_router(calls: &HandlerCalls) -> Router {
    let calls = calls.clone();
    Router::new().fallback(move |request: Request| echo(calls.clone(), request))
}

pub struct Harness {
    pub app: Router,
    pub evaluator: Arc<ScriptedEvaluator>,
    pub calls: HandlerCalls,
}

pub fn harness(options: AuthorizerOptions) -> Harness {
    let evaluator = Arc::new(ScriptedEvaluator::new());
    let calls = HandlerCalls::default();
    let authorizer = AuthorizerLayer::new(evaluator.clone(), data_store(), options);
    let app = AdmissionPipeline::new(authorizer).apply(echo_router(&calls));
    Harness {
        app,
        evaluator,
        calls,
    }
}

#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Value,
}

pub async fn send(app: &Router, request: http::Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Reply {
        status,
        content_type,
        body,
    }
}

pub fn request(method: &str, uri: &str, token: Option<&str>) -> http::request::Builder {
    let builder = http::Request::builder().method(method).uri(uri);
    match token {
        Some(t) => builder.header(http::header::AUTHORIZATION, format!("Bearer {t}")),
        None => builder,
    }
}
