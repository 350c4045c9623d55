//! Policy authorization layer.
//!
//! For every request the authorizer:
//! 1. Decodes the path (400 on a bad escape)
//! 2. Builds the input document from identity, headers and query
//! 3. Reads and decodes the body of `POST` requests and of registered extra
//!    routes, caching it as [`ParsedBody`] and re-attaching the bytes for the
//!    inner service
//! 4. Evaluates the configured decision against a data snapshot
//! 5. Calls the inner service only when the decision admits the request
//!
//! Every other outcome is answered with an [`ErrorV1`](crate::ErrorV1) body.

pub mod body;
pub mod input;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use admission_context::{ParsedBody, RequestContextExt};
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::Request;
use policy_eval_sdk::{
    DataSnapshot, DataStore, Decision, DecisionRef, EvalContext, EvalError, InterQueryCache,
    InterQueryValueCache, PolicyEvaluator, PrintSink, TracingPrintSink,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};

use crate::config::AuthorizerConfig;
use crate::error::AdmissionError;
use body::{BodyError, BodyPathMatcher};
use input::InputDocument;

/// Authorizer settings.
#[derive(Clone)]
pub struct AuthorizerOptions {
    /// Decision evaluated for every request.
    pub decision: DecisionRef,
    /// Runtime information passed to the evaluator.
    pub runtime: Option<Arc<Value>>,
    /// Whether policy print output is delivered.
    pub print_enabled: bool,
    /// Receiver for print output; the tracing sink when unset.
    pub print_sink: Option<Arc<dyn PrintSink>>,
    pub inter_query_cache: Option<Arc<InterQueryCache>>,
    pub inter_query_value_cache: Option<Arc<InterQueryValueCache>>,
    /// Largest body read for body-eligible requests.
    pub body_limit_bytes: usize,
    /// Routes beyond `POST` whose body is read.
    pub extra_body_paths: Vec<BodyPathMatcher>,
    /// Evaluation deadline; unbounded when unset.
    pub eval_timeout: Option<Duration>,
    /// Parent of every per-request token. Cancelling it aborts in-flight
    /// evaluations.
    pub cancellation: CancellationToken,
}

impl Default for AuthorizerOptions {
    fn default() -> Self {
        Self::from_config(&AuthorizerConfig::default())
    }
}

impl std::fmt::Debug for AuthorizerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizerOptions")
            .field("decision", &self.decision)
            .field("runtime", &self.runtime)
            .field("print_enabled", &self.print_enabled)
            .field("print_sink", &self.print_sink.is_some())
            .field("inter_query_cache", &self.inter_query_cache.is_some())
            .field(
                "inter_query_value_cache",
                &self.inter_query_value_cache.is_some(),
            )
            .field("body_limit_bytes", &self.body_limit_bytes)
            .field("extra_body_paths", &self.extra_body_paths.len())
            .field("eval_timeout", &self.eval_timeout)
            .finish_non_exhaustive()
    }
}

impl AuthorizerOptions {
    /// Options from declarative configuration. A configured cache section
    /// enables both inter-query caches.
    #[must_use]
    pub fn from_config(config: &AuthorizerConfig) -> Self {
        let caches = config.inter_query_cache.as_ref();
        Self {
            decision: config.decision.clone(),
            runtime: config.runtime(),
            print_enabled: config.print_enabled,
            print_sink: None,
            inter_query_cache: caches.map(|c| Arc::new(InterQueryCache::new(c))),
            inter_query_value_cache: caches.map(|c| Arc::new(InterQueryValueCache::new(c))),
            body_limit_bytes: config.body_limit_bytes,
            extra_body_paths: Vec::new(),
            eval_timeout: config.eval_timeout(),
            cancellation: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_decision(mut self, decision: DecisionRef) -> Self {
        self.decision = decision;
        self
    }

    #[must_use]
    pub fn with_runtime(mut self, runtime: Value) -> Self {
        self.runtime = Some(Arc::new(runtime));
        self
    }

    /// Enable printing and deliver output to `sink`.
    #[must_use]
    pub fn with_print_sink(mut self, sink: Arc<dyn PrintSink>) -> Self {
        self.print_enabled = true;
        self.print_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_print_enabled(mut self, enabled: bool) -> Self {
        self.print_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_inter_query_cache(mut self, cache: Arc<InterQueryCache>) -> Self {
        self.inter_query_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_inter_query_value_cache(mut self, cache: Arc<InterQueryValueCache>) -> Self {
        self.inter_query_value_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit_bytes = bytes;
        self
    }

    /// Also read the body of requests `matches` accepts. It sees the method
    /// and the decoded path segments.
    #[must_use]
    pub fn with_extra_body_path<F>(mut self, matches: F) -> Self
    where
        F: Fn(&http::Method, &[String]) -> bool + Send + Sync + 'static,
    {
        self.extra_body_paths.push(Arc::new(matches));
        self
    }

    #[must_use]
    pub fn with_eval_timeout(mut self, timeout: Duration) -> Self {
        self.eval_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    fn effective_print_sink(&self) -> Option<Arc<dyn PrintSink>> {
        if !self.print_enabled {
            return None;
        }
        Some(
            self.print_sink
                .clone()
                .unwrap_or_else(|| Arc::new(TracingPrintSink)),
        )
    }
}

/// Shared state for the authorizer middleware.
struct AuthorizerState {
    evaluator: Arc<dyn PolicyEvaluator>,
    store: Arc<dyn DataStore>,
    print_sink: Option<Arc<dyn PrintSink>>,
    options: AuthorizerOptions,
}

impl AuthorizerState {
    fn eval_context(&self, token: CancellationToken) -> EvalContext {
        EvalContext::new(token)
            .with_runtime(self.options.runtime.clone())
            .with_print_sink(self.print_sink.clone())
            .with_inter_query_cache(self.options.inter_query_cache.clone())
            .with_inter_query_value_cache(self.options.inter_query_value_cache.clone())
    }

    /// Run the admission steps. Returns the request to forward, with its
    /// body restored, or the rejection.
    async fn admit(&self, request: Request<Body>) -> Result<Request<Body>, AdmissionError> {
        let (mut parts, payload) = request.into_parts();

        let mut input = InputDocument::build(
            &parts,
            parts.extensions.identity(),
            parts.extensions.cert_identity(),
            None,
        )
        .map_err(|e| {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Rejecting request with malformed path");
            AdmissionError::InvalidPath(e.to_string())
        })?;

        let reads_body =
            body::expects_body(&parts.method, &input.path, &self.options.extra_body_paths);
        let payload = if !reads_body {
            payload
        } else if let Some(cached) = parts.extensions.parsed_body() {
            input.body = Some(cached.clone());
            payload
        } else {
            let bytes = body::read_limited(payload, self.options.body_limit_bytes)
                .await
                .map_err(invalid_body)?;
            if let Some(value) = body::decode(&bytes, body::is_yaml(&parts.headers))
                .map_err(invalid_body)?
            {
                let parsed = ParsedBody::new(value);
                input.body = Some(parsed.value().clone());
                parts.extensions.set_parsed_body(parsed);
            }
            Body::from(bytes)
        };

        let token = self.options.cancellation.child_token();
        let _cancel_on_drop = token.clone().drop_guard();
        let ctx = self.eval_context(token);

        let snapshot = self.store.snapshot().map_err(|e| {
            tracing::error!(error = %e, "Failed to read policy data snapshot");
            AdmissionError::Snapshot(e)
        })?;

        let result = self
            .evaluate(&ctx, &input.to_value(), &snapshot)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Policy evaluation failed");
                AdmissionError::Evaluation(e)
            })?;

        interpret(result, &self.options.decision)?;
        Ok(Request::from_parts(parts, payload))
    }

    #[tracing::instrument(skip_all, fields(decision = %self.options.decision))]
    async fn evaluate(
        &self,
        ctx: &EvalContext,
        input: &Value,
        data: &DataSnapshot,
    ) -> Result<Option<Value>, EvalError> {
        let evaluation = async {
            tokio::select! {
                biased;
                () = ctx.cancellation().cancelled() => Err(EvalError::Cancelled),
                result = self.evaluator.evaluate(ctx, &self.options.decision, input, data) => result,
            }
        };

        let Some(limit) = self.options.eval_timeout else {
            return evaluation.await;
        };
        if let Ok(result) = tokio::time::timeout(limit, evaluation).await {
            result
        } else {
            ctx.cancellation().cancel();
            Err(EvalError::Timeout(limit))
        }
    }
}

fn invalid_body(err: BodyError) -> AdmissionError {
    tracing::warn!(error = %err, "Rejecting request with unreadable body");
    AdmissionError::InvalidBody(err.to_string())
}

/// Map an evaluator result to admission.
fn interpret(result: Option<Value>, decision: &DecisionRef) -> Result<(), AdmissionError> {
    let Some(value) = result else {
        tracing::error!(decision = %decision, "Authorization decision is undefined");
        return Err(AdmissionError::UndefinedDecision);
    };
    match Decision::classify(value) {
        Decision::AllowBool(true) | Decision::AllowObject { allowed: true, .. } => Ok(()),
        Decision::AllowBool(false) => {
            tracing::debug!("Request denied by policy");
            Err(AdmissionError::Unauthorized(None))
        }
        Decision::AllowObject {
            allowed: false,
            reason,
        } => {
            tracing::debug!(reason = ?reason, "Request denied by policy");
            Err(AdmissionError::Unauthorized(reason))
        }
        Decision::Other(value) => {
            tracing::error!(decision = %decision, result = %value, "Authorization decision has unexpected shape");
            Err(AdmissionError::InvalidDecision)
        }
    }
}

/// Layer that authorizes requests against a policy evaluator.
///
/// # Example
/// ```ignore
/// router = router.layer(AuthorizerLayer::new(evaluator, store, AuthorizerOptions::default()));
/// ```
#[derive(Clone)]
pub struct AuthorizerLayer {
    state: Arc<AuthorizerState>,
}

impl AuthorizerLayer {
    pub fn new(
        evaluator: Arc<dyn PolicyEvaluator>,
        store: Arc<dyn DataStore>,
        options: AuthorizerOptions,
    ) -> Self {
        Self {
            state: Arc::new(AuthorizerState {
                evaluator,
                store,
                print_sink: options.effective_print_sink(),
                options,
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &AuthorizerOptions {
        &self.state.options
    }
}

impl<S> Layer<S> for AuthorizerLayer {
    type Service = AuthorizerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizerService {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Service that admits or rejects requests before the inner service.
#[derive(Clone)]
pub struct AuthorizerService<S> {
    inner: S,
    state: Arc<AuthorizerState>,
}

impl<S> Service<Request<Body>> for AuthorizerService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        let not_ready_inner = self.inner.clone();
        let mut ready_inner = std::mem::replace(&mut self.inner, not_ready_inner);

        Box::pin(async move {
            match state.admit(request).await {
                Ok(request) => ready_inner.call(request).await,
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}
