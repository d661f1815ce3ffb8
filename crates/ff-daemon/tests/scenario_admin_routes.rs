//! In-process scenario tests for ff-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot` — no network I/O required.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use chrono::Utc;
use ff_config::EffectiveConfig;
use ff_daemon::{routes, state};
use ff_orders::Order;
use ff_pipeline::Store;
use http_body_util::BodyExt;
use tower::ServiceExt; // oneshot
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fresh sandbox state plus a seeded order in `pending`. Signature checks
/// are explicitly off so these tests are independent of ambient env vars;
/// the signature test re-enables them with a known secret.
fn make_state_with_order() -> (Arc<state::AppState>, Uuid) {
    let mut st = state::AppState::sandbox(EffectiveConfig::sandbox_defaults());
    st.webhook_secret = None;
    let st = Arc::new(st);
    let order = Order::new(
        "ORD-2025-0001",
        "jane@example.com",
        "Jane Doe",
        "100Mbps Fibre",
        69_900,
        Utc::now(),
    );
    let id = order.id;
    st.store.insert_order(&order).expect("seed order");
    (st, id)
}

async fn call(
    router: axum::Router,
    req: Request<axum::body::Body>,
) -> (StatusCode, serde_json::Value) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).expect("body is not valid JSON")
    };
    (status, json)
}

fn patch_status(id: Uuid, body: serde_json::Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("PATCH")
        .uri(format!("/v1/orders/{id}/status"))
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let (st, _) = make_state_with_order();
    let router = routes::build_router(st);
    let req = Request::builder()
        .method("GET")
        .uri("/v1/health")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, json) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "ff-daemon");
    assert_eq!(json["mode"], "SANDBOX");
}

// ---------------------------------------------------------------------------
// GET /v1/orders/{id}/status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn order_status_reports_current_and_allowed_set() {
    let (st, id) = make_state_with_order();
    let router = routes::build_router(st);
    let req = Request::builder()
        .method("GET")
        .uri(format!("/v1/orders/{id}/status"))
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, json) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["current_status"], "pending");
    assert_eq!(
        json["allowed_next_statuses"],
        serde_json::json!(["payment_pending", "cancelled"])
    );
}

#[tokio::test]
async fn unknown_order_is_404() {
    let (st, _) = make_state_with_order();
    let router = routes::build_router(st);
    let req = Request::builder()
        .method("GET")
        .uri(format!("/v1/orders/{}/status", Uuid::new_v4()))
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, _) = call(router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// PATCH /v1/orders/{id}/status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_to_active_is_refused_with_allowed_set() {
    let (st, id) = make_state_with_order();
    let router = routes::build_router(st);

    let (status, json) = call(
        router,
        patch_status(id, serde_json::json!({ "status": "active" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["current_status"], "pending");
    assert_eq!(
        json["allowed_next_statuses"],
        serde_json::json!(["payment_pending", "cancelled"])
    );
}

#[tokio::test]
async fn pending_to_payment_pending_succeeds() {
    let (st, id) = make_state_with_order();
    let router = routes::build_router(Arc::clone(&st));

    let (status, json) = call(
        router,
        patch_status(id, serde_json::json!({ "status": "payment_pending" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["current_status"], "payment_pending");

    // The transition appended exactly one audit row.
    let history = st.store.status_history(id).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status.as_str(), "pending");
    assert_eq!(history[0].new_status.as_str(), "payment_pending");
}

#[tokio::test]
async fn cancellation_without_notes_is_422() {
    let (st, id) = make_state_with_order();
    let router = routes::build_router(st);

    let (status, json) = call(
        router,
        patch_status(id, serde_json::json!({ "status": "cancelled" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(
        json["error"].as_str().unwrap_or_default().contains("reason"),
        "error should explain the missing reason: {json}"
    );
}

#[tokio::test]
async fn scheduling_without_a_date_is_422() {
    let (st, id) = make_state_with_order();
    let router = routes::build_router(Arc::clone(&st));

    // Walk the order to payment_registered first.
    for step in ["payment_pending", "payment_registered"] {
        let (status, _) = call(
            routes::build_router(Arc::clone(&st)),
            patch_status(id, serde_json::json!({ "status": step })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "setup transition to {step}");
    }

    let (status, _) = call(
        router,
        patch_status(id, serde_json::json!({ "status": "installation_scheduled" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, json) = call(
        routes::build_router(st),
        patch_status(
            id,
            serde_json::json!({
                "status": "installation_scheduled",
                "scheduled_date": "2025-11-20",
                "scheduled_time_slot": "08:00-12:00"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["current_status"], "installation_scheduled");
}

// ---------------------------------------------------------------------------
// POST /v1/webhooks/regulator
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_event_kind_is_rejected_with_400() {
    let (st, _) = make_state_with_order();
    let router = routes::build_router(st);

    let body = serde_json::json!({
        "event": "superseded",
        "submission_id": Uuid::new_v4(),
        "order_id": Uuid::new_v4(),
        "regulator_tracking_id": "RICA-2025-000001"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/regulator")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();

    let (status, _) = call(router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_signature_is_enforced_when_secret_is_configured() {
    let (st, _) = make_state_with_order();
    let mut st = Arc::try_unwrap(st).unwrap_or_else(|arc| (*arc).clone());
    let secret = b"webhook-secret".to_vec();
    st.webhook_secret = Some(Arc::new(secret.clone()));
    let st = Arc::new(st);

    let body = serde_json::json!({
        "event": "approved",
        "submission_id": Uuid::new_v4(),
        "order_id": Uuid::new_v4(),
        "regulator_tracking_id": "RICA-2025-000001"
    })
    .to_string();

    // Unsigned: refused outright.
    let req = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/regulator")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.clone()))
        .unwrap();
    let (status, _) = call(routes::build_router(Arc::clone(&st)), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Correctly signed: passes the signature gate; fails later only because
    // the submission does not exist (400, not 401).
    let signature = ff_connect::compute_signature(&secret, body.as_bytes());
    let req = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/regulator")
        .header("content-type", "application/json")
        .header("x-regulator-signature", signature)
        .body(axum::body::Body::from(body))
        .unwrap();
    let (status, json) = call(routes::build_router(st), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        json["error"]
            .as_str()
            .unwrap_or_default()
            .contains("unknown submission"),
        "{json}"
    );
}
