//! End-to-end API tests
//!
//! These exercise the full router: auth middleware, the async write path
//! through the queue consumers, segment preview, and campaign delivery
//! accounting.

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use serde_json::{json, Value};
use uuid::Uuid;

use crm_api::config::Config;
use crm_api::models::CustomerInput;
use crm_api::{auth, build_router, worker, AppState};

fn test_server() -> (TestServer, AppState) {
    let state = AppState::new(Config::default());
    worker::spawn_all(&state);
    let server = TestServer::new(build_router(state.clone())).unwrap();
    (server, state)
}

fn bearer(state: &AppState) -> (HeaderName, HeaderValue) {
    let token = auth::create_token(
        &state.config.jwt_secret,
        state.config.jwt_ttl_hours,
        "user-1",
        "tester@example.com",
        "Tester",
    )
    .unwrap();
    (
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    )
}

async fn seed_customer(state: &AppState, email: &str, total_spent: f64) -> Uuid {
    state
        .store
        .apply_customer_create(&CustomerInput {
            email: email.into(),
            name: "Seeded".into(),
            last_active: None,
            total_spent: Some(total_spent),
            visit_count: None,
            order_count: None,
            days_since_last_order: None,
        })
        .await
        .id
}

#[tokio::test]
async fn health_is_public() {
    let (server, _state) = test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "ok" }));
}

#[tokio::test]
async fn api_routes_require_auth() {
    let (server, _state) = test_server();

    let response = server.get("/api/customers").await;
    response.assert_status_unauthorized();
    response.assert_json(&json!({ "message": "Unauthorized" }));

    let response = server
        .get("/api/campaigns")
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_static("Bearer not-a-token"),
        )
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn me_returns_claims() {
    let (server, state) = test_server();
    let (name, value) = bearer(&state);

    let response = server.get("/auth/me").add_header(name, value).await;
    response.assert_status_ok();
    let claims: Value = response.json();
    assert_eq!(claims["email"], "tester@example.com");
    assert_eq!(claims["sub"], "user-1");
}

#[tokio::test]
async fn logout_is_stateless() {
    let (server, state) = test_server();
    let (name, value) = bearer(&state);

    let response = server.post("/auth/logout").add_header(name, value).await;
    response.assert_status_ok();
    response.assert_json(&json!({ "message": "Logged out successfully" }));
}

#[tokio::test]
async fn customer_create_is_eventually_consistent() {
    let (server, state) = test_server();
    let (name, value) = bearer(&state);

    let response = server
        .post("/api/customers")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "email": "nina@example.com",
            "name": "Nina",
            "totalSpent": 250.0
        }))
        .await;
    // Accepted, not yet applied.
    response.assert_status(axum::http::StatusCode::ACCEPTED);

    let mut applied = Vec::new();
    for _ in 0..200 {
        let response = server
            .get("/api/customers")
            .add_header(name.clone(), value.clone())
            .await;
        applied = response.json::<Vec<Value>>();
        if !applied.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0]["email"], "nina@example.com");
}

#[tokio::test]
async fn customer_validation_reports_fields() {
    let (server, state) = test_server();
    let (name, value) = bearer(&state);

    let response = server
        .post("/api/customers")
        .add_header(name, value)
        .json(&json!({ "email": "not-an-email", "name": "" }))
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"name"));
}

#[tokio::test]
async fn segment_preview_counts_matching_customers() {
    let (server, state) = test_server();
    let (name, value) = bearer(&state);

    seed_customer(&state, "rich@example.com", 1500.0).await;
    seed_customer(&state, "thrifty@example.com", 500.0).await;

    let response = server
        .post("/api/segments/preview")
        .add_header(name, value)
        .json(&json!({
            "rules": {
                "combinator": "and",
                "rules": [{ "field": "totalSpent", "operator": ">", "value": 1000 }]
            }
        }))
        .await;
    response.assert_status_ok();
    response.assert_json(&json!({ "count": 1 }));
}

#[tokio::test]
async fn segment_preview_ignores_unsupported_leaves() {
    let (server, state) = test_server();
    let (name, value) = bearer(&state);

    seed_customer(&state, "rich@example.com", 1500.0).await;
    seed_customer(&state, "thrifty@example.com", 500.0).await;

    let response = server
        .post("/api/segments/preview")
        .add_header(name, value)
        .json(&json!({
            "rules": {
                "combinator": "and",
                "rules": [
                    { "field": "totalSpent", "operator": ">", "value": 1000 },
                    { "field": "loyaltyTier", "operator": "~=", "value": "gold" }
                ]
            }
        }))
        .await;
    response.assert_status_ok();
    response.assert_json(&json!({ "count": 1 }));
}

#[tokio::test]
async fn segment_preview_requires_rules() {
    let (server, state) = test_server();
    let (name, value) = bearer(&state);

    let response = server
        .post("/api/segments/preview")
        .add_header(name, value)
        .json(&json!({}))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn segment_crud_and_member_preview() {
    let (server, state) = test_server();
    let (name, value) = bearer(&state);

    let rich = seed_customer(&state, "rich@example.com", 1500.0).await;
    seed_customer(&state, "thrifty@example.com", 500.0).await;

    let response = server
        .post("/api/segments")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "name": "Big spenders",
            "rules": {
                "combinator": "and",
                "rules": [{ "field": "totalSpent", "operator": ">=", "value": 1000 }]
            },
            "createdBy": "user-1"
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let segment: Value = response.json();
    let id = segment["id"].as_str().unwrap().to_string();

    let response = server
        .get(&format!("/api/segments/{id}"))
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status_ok();
    let detail: Value = response.json();
    assert_eq!(detail["customerCount"], 1);
    let members = detail["members"].as_array().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["id"], rich.to_string());

    let response = server
        .delete(&format!("/api/segments/{id}"))
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);

    let response = server
        .get(&format!("/api/segments/{id}"))
        .add_header(name, value)
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn campaign_requires_known_segment() {
    let (server, state) = test_server();
    let (name, value) = bearer(&state);

    let response = server
        .post("/api/campaigns")
        .add_header(name, value)
        .json(&json!({
            "name": "Orphan",
            "segmentId": Uuid::new_v4(),
            "message": "Hello",
            "createdBy": "user-1"
        }))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn campaign_delivery_accounting() {
    let (server, state) = test_server();
    let (name, value) = bearer(&state);

    let first = seed_customer(&state, "a@example.com", 2000.0).await;
    seed_customer(&state, "b@example.com", 3000.0).await;

    let response = server
        .post("/api/segments")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "name": "All spenders",
            "rules": {
                "combinator": "and",
                "rules": [{ "field": "totalSpent", "operator": ">", "value": 1000 }]
            },
            "createdBy": "user-1"
        }))
        .await;
    let segment: Value = response.json();

    let response = server
        .post("/api/campaigns")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "name": "Spring sale",
            "segmentId": segment["id"],
            "message": "20% off this week",
            "createdBy": "user-1"
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let campaign: Value = response.json();
    assert_eq!(campaign["status"], "draft");
    let id = campaign["id"].as_str().unwrap().to_string();

    // The dispatch worker sizes the audience and moves it to sending.
    let mut current = Value::Null;
    for _ in 0..200 {
        let response = server
            .get(&format!("/api/campaigns/{id}"))
            .add_header(name.clone(), value.clone())
            .await;
        current = response.json();
        if current["status"] == "sending" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(current["status"], "sending");
    assert_eq!(current["stats"], json!({ "total": 2, "sent": 0, "failed": 0, "pending": 2 }));

    let response = server
        .post(&format!("/api/campaigns/{id}/delivery-status"))
        .add_header(name.clone(), value.clone())
        .json(&json!({ "status": "sent", "customerId": first }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["duplicate"], false);
    assert_eq!(body["stats"], json!({ "total": 2, "sent": 1, "failed": 0, "pending": 1 }));

    // Same receipt again: acknowledged but not double-counted.
    let response = server
        .post(&format!("/api/campaigns/{id}/delivery-status"))
        .add_header(name.clone(), value.clone())
        .json(&json!({ "status": "sent", "customerId": first }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["duplicate"], true);
    assert_eq!(body["stats"], json!({ "total": 2, "sent": 1, "failed": 0, "pending": 1 }));

    let response = server
        .post(&format!("/api/campaigns/{}/delivery-status", Uuid::new_v4()))
        .add_header(name, value)
        .json(&json!({ "status": "sent", "customerId": first }))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn campaign_deliveries_are_claimed_in_batches() {
    let (server, state) = test_server();
    let (name, value) = bearer(&state);

    let first = seed_customer(&state, "a@example.com", 2000.0).await;
    let second = seed_customer(&state, "b@example.com", 3000.0).await;

    let response = server
        .post("/api/segments")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "name": "All spenders",
            "rules": {
                "combinator": "and",
                "rules": [{ "field": "totalSpent", "operator": ">", "value": 1000 }]
            },
            "createdBy": "user-1"
        }))
        .await;
    let segment: Value = response.json();

    let response = server
        .post("/api/campaigns")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "name": "Spring sale",
            "segmentId": segment["id"],
            "message": "20% off this week",
            "createdBy": "user-1"
        }))
        .await;
    let campaign: Value = response.json();
    let id = campaign["id"].as_str().unwrap().to_string();

    for _ in 0..200 {
        let response = server
            .get(&format!("/api/campaigns/{id}"))
            .add_header(name.clone(), value.clone())
            .await;
        if response.json::<Value>()["status"] == "sending" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // First claim drains the staged deliveries.
    let response = server
        .post(&format!("/api/campaigns/{id}/deliveries/claim"))
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let deliveries = body["deliveries"].as_array().unwrap();
    assert_eq!(deliveries.len(), 2);
    let customer_ids: Vec<&str> = deliveries
        .iter()
        .map(|d| d["customerId"].as_str().unwrap())
        .collect();
    assert!(customer_ids.contains(&first.to_string().as_str()));
    assert!(customer_ids.contains(&second.to_string().as_str()));
    assert_eq!(deliveries[0]["message"], "20% off this week");

    // A second claim finds nothing left.
    let response = server
        .post(&format!("/api/campaigns/{id}/deliveries/claim"))
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status_ok();
    assert!(response.json::<Value>()["deliveries"]
        .as_array()
        .unwrap()
        .is_empty());

    // Unknown campaigns cannot be claimed against.
    let response = server
        .post(&format!("/api/campaigns/{}/deliveries/claim", Uuid::new_v4()))
        .add_header(name, value)
        .await;
    response.assert_status_not_found();
}
