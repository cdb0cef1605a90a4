// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Reverse-proxy capture path against a mock upstream: forwarding, body
//! teeing into the live buffer, and failure handling.

use drift_http::auth::PermissiveVerifier;
use drift_http::proxy::ProxyTarget;
use drift_http::server::{handle_request, AppState};
use hyper::{Body, Request, StatusCode};
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn state_with_project() -> (Arc<AppState>, Uuid) {
    let state = Arc::new(AppState::new(Arc::new(PermissiveVerifier)));
    let project = state.store.create_project("tester", "demo", "");
    (state, project.id)
}

fn pinned_local_target(label: &str, base_uri: &str) -> ProxyTarget {
    let url = reqwest::Url::parse(base_uri).expect("mock server uri");
    let ip: IpAddr = "127.0.0.1".parse().expect("loopback");
    ProxyTarget::pinned(label, url, ip).expect("build target")
}

fn proxied(method_name: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method_name)
        .uri(uri)
        .header("authorization", "Bearer tester")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn forwards_get_and_captures_the_exchange() -> anyhow::Result<()> {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-upstream", "yes")
                .set_body_json(serde_json::json!({"id": "u-1", "name": "ada"})),
        )
        .mount(&mock)
        .await;

    let (state, project_id) = state_with_project();
    state
        .proxies
        .insert(project_id, pinned_local_target("staging", &mock.uri()));

    let uri = format!("/api/live/proxy/{}/staging/api/users?page=2", project_id);
    let resp = handle_request(proxied("GET", &uri, ""), state.clone()).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("x-upstream").unwrap(), "yes");
    let bytes = hyper::body::to_bytes(resp.into_body()).await?;
    let v: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(v["id"], "u-1");

    let captured = state.live.get_recent(project_id);
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].source, "staging");
    assert_eq!(captured[0].method, "GET");
    assert_eq!(captured[0].path, "/api/users");
    assert_eq!(captured[0].status_code, 200);
    assert_eq!(captured[0].response_body.as_ref().unwrap()["name"], "ada");
    Ok(())
}

#[tokio::test]
async fn forwards_post_bodies_and_captures_both_sides() -> anyhow::Result<()> {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users"))
        .and(body_json(serde_json::json!({"name": "ada"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "u-9"})))
        .mount(&mock)
        .await;

    let (state, project_id) = state_with_project();
    state
        .proxies
        .insert(project_id, pinned_local_target("staging", &mock.uri()));

    let uri = format!("/api/live/proxy/{}/staging/api/users", project_id);
    let resp = handle_request(proxied("POST", &uri, r#"{"name": "ada"}"#), state.clone()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let captured = state.live.get_recent(project_id);
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].request_body.as_ref().unwrap()["name"], "ada");
    assert_eq!(captured[0].response_body.as_ref().unwrap()["id"], "u-9");
    assert_eq!(captured[0].status_code, 201);
    Ok(())
}

#[tokio::test]
async fn bare_proxy_prefix_forwards_to_root() -> anyhow::Result<()> {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&mock)
        .await;

    let (state, project_id) = state_with_project();
    state
        .proxies
        .insert(project_id, pinned_local_target("staging", &mock.uri()));

    let uri = format!("/api/live/proxy/{}/staging/", project_id);
    let resp = handle_request(proxied("GET", &uri, ""), state.clone()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(state.live.get_recent(project_id)[0].path, "/");
    Ok(())
}

#[tokio::test]
async fn upstream_failure_is_502_and_not_captured() -> anyhow::Result<()> {
    let (state, project_id) = state_with_project();
    // port 9 (discard) is almost certainly closed; the dial must fail
    state.proxies.insert(
        project_id,
        pinned_local_target("broken", "http://127.0.0.1:9/"),
    );

    let uri = format!("/api/live/proxy/{}/broken/api/users", project_id);
    let resp = handle_request(proxied("GET", &uri, ""), state.clone()).await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let bytes = hyper::body::to_bytes(resp.into_body()).await?;
    let v: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert!(v["error"].as_str().unwrap().starts_with("Proxy error"));

    assert!(state.live.get_recent(project_id).is_empty());
    Ok(())
}

#[tokio::test]
async fn non_json_upstream_bodies_pass_through_uncaptured() -> anyhow::Result<()> {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
        .mount(&mock)
        .await;

    let (state, project_id) = state_with_project();
    state
        .proxies
        .insert(project_id, pinned_local_target("staging", &mock.uri()));

    let uri = format!("/api/live/proxy/{}/staging/page", project_id);
    let resp = handle_request(proxied("GET", &uri, ""), state.clone()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = hyper::body::to_bytes(resp.into_body()).await?;
    assert_eq!(&bytes[..], b"<html>hi</html>");

    // the exchange is buffered, the non-object body is not
    let captured = state.live.get_recent(project_id);
    assert_eq!(captured.len(), 1);
    assert!(captured[0].response_body.is_none());
    Ok(())
}

#[tokio::test]
async fn inferred_proxy_traffic_feeds_live_diff() -> anyhow::Result<()> {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/items"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"sku": "a", "qty": 2})),
        )
        .mount(&mock)
        .await;

    let (state, project_id) = state_with_project();
    state
        .proxies
        .insert(project_id, pinned_local_target("staging", &mock.uri()));

    let uri = format!("/api/live/proxy/{}/staging/api/items", project_id);
    handle_request(proxied("GET", &uri, ""), state.clone()).await;

    let schemas = state.live.infer(project_id, Some("staging"));
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas[0].endpoint, "/api/items");
    let fields = &schemas[0].response[&200].fields;
    assert_eq!(fields["sku"].field_type, "string");
    assert_eq!(fields["qty"].field_type, "number");
    Ok(())
}
