//! Router-level API tests over the in-memory stack.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use keymarket_returns::auth::{
    ApiKeyRecord, ApiKeyValidator, AuthMiddlewareState, Authenticator, Role,
};
use keymarket_returns::domain::{GrantId, Order};
use keymarket_returns::infra::ConflictRetry;
use keymarket_returns::server::AppState;

use common::*;

const USER_KEY: &str = "km_test_user_key";
const OPERATOR_KEY: &str = "km_test_operator_key";

fn test_app(env: &TestEnv) -> Router {
    let validator = ApiKeyValidator::new();
    validator.register_key(ApiKeyRecord {
        key_hash: ApiKeyValidator::hash_key(USER_KEY),
        user_id: test_customer_id(),
        role: Role::User,
        active: true,
    });
    validator.register_key(ApiKeyRecord {
        key_hash: ApiKeyValidator::hash_key(OPERATOR_KEY),
        user_id: test_operator_id(),
        role: Role::Operator,
        active: true,
    });

    let auth_state = AuthMiddlewareState {
        authenticator: Arc::new(Authenticator::new(validator)),
    };
    let state = AppState {
        engine: env.engine.clone(),
        admin: env.admin.clone(),
        retry: ConflictRetry::default(),
        pool: None,
    };

    keymarket_returns::server::build_router(auth_state)
        .expect("router")
        .with_state(state)
}

fn request(method: Method, uri: &str, key: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("authorization", format!("ApiKey {key}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_body(order: &Order, grants: &[GrantId]) -> Value {
    json!({
        "order_id": order.id,
        "reason": "Key does not activate",
        "grant_ids": grants,
    })
}

#[tokio::test]
async fn requests_without_credentials_are_unauthorized() {
    let env = test_env();
    let app = test_app(&env);

    let response = app
        .oneshot(request(Method::GET, "/api/v1/returns/my-returns", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn users_cannot_reach_the_admin_surface() {
    let env = test_env();
    let app = test_app(&env);

    let response = app
        .oneshot(request(
            Method::GET,
            "/api/v1/returns/admin/summary",
            Some(USER_KEY),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers().get("x-error-code").unwrap(),
        "INSUFFICIENT_PERMISSIONS"
    );
}

#[tokio::test]
async fn create_and_fetch_return() {
    let env = test_env();
    let app = test_app(&env);
    let (order, grants) = env.seed_order(test_customer_id(), 100_000, 500, 20_000, 5);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/returns",
            Some(USER_KEY),
            Some(create_body(&order, &grants[..1])),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["status"], "pending");
    assert_eq!(created["refund_amount"], 20_000);

    let id = created["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/v1/returns/{id}"),
            Some(USER_KEY),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request(
            Method::GET,
            "/api/v1/returns/my-returns",
            Some(USER_KEY),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    assert_eq!(listing["total"], 1);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let env = test_env();
    let app = test_app(&env);

    let response = app
        .oneshot(request(
            Method::POST,
            "/api/v1/returns",
            Some(USER_KEY),
            Some(json!({
                "order_id": "99999999-9999-9999-9999-999999999999",
                "reason": "Key does not activate",
                "grant_ids": ["88888888-8888-8888-8888-888888888888"],
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get("x-error-code").unwrap(),
        "ORDER_NOT_FOUND"
    );
}

#[tokio::test]
async fn duplicate_claim_conflicts() {
    let env = test_env();
    let app = test_app(&env);
    let (order, grants) = env.seed_order(test_customer_id(), 50_000, 0, 10_000, 5);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/returns",
            Some(USER_KEY),
            Some(create_body(&order, &grants[..1])),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(request(
            Method::POST,
            "/api/v1/returns",
            Some(USER_KEY),
            Some(create_body(&order, &grants[..1])),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        response.headers().get("x-error-code").unwrap(),
        "GRANT_ALREADY_CLAIMED"
    );
}

#[tokio::test]
async fn empty_reason_is_unprocessable() {
    let env = test_env();
    let app = test_app(&env);
    let (order, grants) = env.seed_order(test_customer_id(), 50_000, 0, 10_000, 2);

    let response = app
        .oneshot(request(
            Method::POST,
            "/api/v1/returns",
            Some(USER_KEY),
            Some(json!({
                "order_id": order.id,
                "reason": "   ",
                "grant_ids": &grants[..1],
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.headers().get("x-error-code").unwrap(), "NOT_ELIGIBLE");
}

#[tokio::test]
async fn operator_process_and_finalize_flow() {
    let env = test_env();
    let app = test_app(&env);
    let (order, grants) = env.seed_order(test_customer_id(), 100_000, 500, 20_000, 5);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/returns",
            Some(USER_KEY),
            Some(create_body(&order, &grants[..1])),
        ))
        .await
        .unwrap();
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/returns/admin/{id}/process"),
            Some(OPERATOR_KEY),
            Some(json!({"status": "approved", "admin_notes": "verified"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "approved");

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/returns/admin/{id}/finalize"),
            Some(OPERATOR_KEY),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "refunded");

    // Processing again conflicts: refunded is terminal.
    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/returns/admin/{id}/process"),
            Some(OPERATOR_KEY),
            Some(json!({"status": "rejected"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        response.headers().get("x-error-code").unwrap(),
        "INVALID_STATE_TRANSITION"
    );

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            "/api/v1/returns/admin/summary",
            Some(OPERATOR_KEY),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["refunded"], 1);
    assert_eq!(summary["total_refunded_amount"], 20_000);

    // The customer sees the credited points.
    let response = app
        .oneshot(request(
            Method::GET,
            "/api/v1/points/balance",
            Some(USER_KEY),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["balance"], 1_900);
}

#[tokio::test]
async fn eligibility_shrinks_as_grants_are_claimed() {
    let env = test_env();
    let app = test_app(&env);
    let (order, grants) = env.seed_order(test_customer_id(), 50_000, 0, 10_000, 3);

    let uri = format!("/api/v1/returns/eligibility/{}", order.id);
    let response = app
        .clone()
        .oneshot(request(Method::GET, &uri, Some(USER_KEY), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let before = body_json(response).await;
    assert_eq!(before["eligible_grants"].as_array().unwrap().len(), 3);
    // Key previews are masked.
    let preview = before["eligible_grants"][0]["key_preview"].as_str().unwrap();
    assert!(preview.ends_with("****"));

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/returns",
            Some(USER_KEY),
            Some(create_body(&order, &grants[..2])),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(request(Method::GET, &uri, Some(USER_KEY), None))
        .await
        .unwrap();
    let after = body_json(response).await;
    assert_eq!(after["eligible_grants"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn points_history_lists_newest_first() {
    let env = test_env();
    let app = test_app(&env);
    env.seed_earned_points(test_customer_id(), 500).await;
    env.seed_earned_points(test_customer_id(), 200).await;

    let response = app
        .oneshot(request(
            Method::GET,
            "/api/v1/points/history?limit=1",
            Some(USER_KEY),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history = body_json(response).await;
    assert_eq!(history["total"], 2);
    assert_eq!(history["items"].as_array().unwrap().len(), 1);
    assert_eq!(history["items"][0]["amount"], 200);
}

#[tokio::test]
async fn health_probes_do_not_require_auth() {
    let env = test_env();
    let app = test_app(&env);

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request(Method::GET, "/ready", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
