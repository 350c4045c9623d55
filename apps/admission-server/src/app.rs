use std::path::Path;
use std::sync::Arc;

use admission_context::{CertIdentity, RequestContextExt};
use admission_gateway::{AdmissionPipeline, AuthorizerLayer, AuthorizerOptions};
use anyhow::Context;
use axum::extract::Request;
use axum::{Json, Router};
use policy_eval_sdk::InMemoryDataStore;
use serde_json::{Value, json};
use static_policy_plugin::StaticPolicyEvaluator;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

/// Reads the initial data document; `.yaml`/`.yml` files are parsed as YAML,
/// everything else as JSON.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_data(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read data file {}", path.display()))?;
    let yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let value = if yaml {
        serde_saphyr::from_str(&raw).map_err(|e| anyhow::anyhow!("{e}"))
    } else {
        serde_json::from_str(&raw).map_err(anyhow::Error::from)
    };
    value.with_context(|| format!("failed to parse data file {}", path.display()))
}

fn data_store(config: &ServerConfig) -> anyhow::Result<InMemoryDataStore> {
    let Some(path) = config.data_path.as_deref() else {
        return Ok(InMemoryDataStore::new());
    };
    let store = InMemoryDataStore::from_value(load_data(path)?)
        .with_context(|| format!("data file {} must hold an object", path.display()))?;
    tracing::info!(path = %path.display(), "policy data loaded");
    Ok(store)
}

/// Reports what the admission pipeline attached to the request.
async fn echo(request: Request) -> Json<Value> {
    let ext = request.extensions();
    Json(json!({
        "method": request.method().as_str(),
        "path": request.uri().path(),
        "identity": ext.identity(),
        "cert_identity": ext.cert_identity().map(CertIdentity::subject),
        "body": ext.parsed_body(),
    }))
}

/// The demo application behind the admission pipeline.
///
/// # Errors
/// Returns an error if the data file cannot be loaded.
pub fn build_router(config: &ServerConfig, shutdown: CancellationToken) -> anyhow::Result<Router> {
    let store = Arc::new(data_store(config)?);
    let evaluator = Arc::new(StaticPolicyEvaluator::new(config.policy.clone()));
    let options = AuthorizerOptions::from_config(&config.authorizer).with_cancellation(shutdown);
    tracing::debug!(?options, "authorizer configured");

    let authorizer = AuthorizerLayer::new(evaluator, store, options);
    let router = AdmissionPipeline::new(authorizer).apply(Router::new().fallback(echo));
    Ok(router.layer(TraceLayer::new_for_http()))
}
