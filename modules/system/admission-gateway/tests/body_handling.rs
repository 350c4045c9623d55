#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Body reading, decoding and caching for body-eligible requests.

mod common;

use admission_context::{ParsedBody, RequestContextExt};
use admission_gateway::AuthorizerOptions;
use axum::body::Body;
use common::{harness, request, send};
use http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn post_body_is_decoded_and_cached() {
    let h = harness(AuthorizerOptions::default());
    let req = request("POST", "/v1/data", Some("admin"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"foo":"bar"}"#))
        .unwrap();
    let reply = send(&h.app, req).await;

    assert_eq!(reply.status, StatusCode::OK);
    let input = h.evaluator.last_input();
    assert_eq!(input["body"], json!({"foo": "bar"}));
    assert_eq!(reply.body["parsed_body"], input["body"]);
    assert_eq!(reply.body["raw_body"], json!(r#"{"foo":"bar"}"#));
}

#[tokio::test]
async fn put_body_is_not_read() {
    let h = harness(AuthorizerOptions::default());
    let req = request("PUT", "/v1/data", Some("admin"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"foo":"bar"}"#))
        .unwrap();
    let reply = send(&h.app, req).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(h.evaluator.last_input().get("body").is_none());
    assert_eq!(reply.body["parsed_body"], json!(null));
    assert_eq!(reply.body["raw_body"], json!(r#"{"foo":"bar"}"#));
}

#[tokio::test]
async fn registered_route_body_is_read_for_put() {
    let options = AuthorizerOptions::default().with_extra_body_path(|method, path| {
        method == http::Method::PUT
            && matches!(path.first().map(String::as_str), Some("v0" | "v1"))
            && path.get(1).is_some_and(|s| s == "example-plugin")
    });
    let h = harness(options);

    let req = request("PUT", "/v1/example-plugin", Some("admin"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"example":"A"}"#))
        .unwrap();
    let reply = send(&h.app, req).await;

    assert_eq!(reply.status, StatusCode::OK);
    let input = h.evaluator.last_input();
    assert_eq!(input["body"], json!({"example": "A"}));
    assert_eq!(reply.body["parsed_body"], input["body"]);
    assert_eq!(reply.body["raw_body"], json!(r#"{"example":"A"}"#));

    let req = request("PUT", "/v1/policies/test", Some("admin"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"example":"A"}"#))
        .unwrap();
    let reply = send(&h.app, req).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(h.evaluator.last_input().get("body").is_none());
    assert_eq!(reply.body["parsed_body"], json!(null));
}

#[tokio::test]
async fn patch_and_get_bodies_are_not_read() {
    for method in ["PATCH", "GET"] {
        let h = harness(AuthorizerOptions::default());
        let req = request(method, "/v0/data", Some("admin"))
            .body(Body::from("not json at all"))
            .unwrap();
        let reply = send(&h.app, req).await;

        assert_eq!(reply.status, StatusCode::OK, "{method}");
        assert!(h.evaluator.last_input().get("body").is_none(), "{method}");
        assert_eq!(reply.body["raw_body"], json!("not json at all"), "{method}");
    }
}

#[tokio::test]
async fn yaml_body_is_decoded() {
    let h = harness(AuthorizerOptions::default());
    let req = request("POST", "/v1/policies/test", Some("admin"))
        .header(http::header::CONTENT_TYPE, "application/x-yaml")
        .body(Body::from("foo: bar\nitems:\n  - 1\n  - 2\n"))
        .unwrap();
    let reply = send(&h.app, req).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        h.evaluator.last_input()["body"],
        json!({"foo": "bar", "items": [1, 2]})
    );
}

#[tokio::test]
async fn empty_post_body_has_no_body_field() {
    let h = harness(AuthorizerOptions::default());
    let reply = send(
        &h.app,
        request("POST", "/v1/data", Some("admin")).body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(h.evaluator.last_input().get("body").is_none());
    assert_eq!(reply.body["parsed_body"], json!(null));
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let h = harness(AuthorizerOptions::default());
    let reply = send(
        &h.app,
        request("POST", "/v1/data", Some("admin"))
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["code"], json!("invalid_parameter"));
    assert_eq!(h.calls.count(), 0);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let h = harness(AuthorizerOptions::default().with_body_limit(8));
    let reply = send(
        &h.app,
        request("POST", "/v1/data", Some("admin"))
            .body(Body::from(r#"{"foo":"a long value"}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["code"], json!("invalid_parameter"));
    assert_eq!(h.evaluator.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn previously_parsed_body_is_reused() {
    let h = harness(AuthorizerOptions::default());
    let mut req = request("POST", "/v1/data", Some("admin"))
        .body(Body::from("{this would not parse"))
        .unwrap();
    req.extensions_mut()
        .set_parsed_body(ParsedBody::new(json!({"cached": true})));
    let reply = send(&h.app, req).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(h.evaluator.last_input()["body"], json!({"cached": true}));
    assert_eq!(reply.body["parsed_body"], json!({"cached": true}));
    assert_eq!(reply.body["raw_body"], json!("{this would not parse"));
}
