//! Axum router and all HTTP handlers for ff-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use ff_orders::{allowed_next, plan_transition, OrderStatus, TransitionContext, TransitionError};
use ff_pipeline::{
    ActivationOutcome, ActivationService, PipelineError, WebhookOutcome, WebhookProcessor,
};
use ff_schemas::{RegulatorEvent, SlaTracking, SubmissionStatus};

use crate::{
    api_types::{
        ActivateResponse, ErrorResponse, HealthResponse, OrderStatusResponse,
        PatchOrderStatusRequest, TransitionRefusedResponse, WebhookAck,
    },
    state::{AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/webhooks/regulator", post(regulator_webhook))
        .route(
            "/v1/orders/:id/status",
            get(order_status).patch(order_status_patch),
        )
        .route("/v1/orders/:id/activate", post(order_activate))
        .route("/v1/orders/stream", get(stream))
        .with_state(state)
}

fn allowed_names(status: OrderStatus) -> Vec<String> {
    allowed_next(status)
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            mode: st.config.mode.as_str().to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/webhooks/regulator
// ---------------------------------------------------------------------------

/// Regulator callback intake. Signature first, strict parse second, then the
/// processor. Applied/Duplicate/Conflict all return 200 so the regulator
/// stops re-sending; only transport-level trouble earns a 5xx (and a
/// redelivery).
pub(crate) async fn regulator_webhook(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &st.webhook_secret {
        let provided = headers
            .get("x-regulator-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !ff_connect::verify_signature(secret.as_slice(), body.as_ref(), provided) {
            warn!("regulator webhook signature verification failed");
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "invalid webhook signature".to_string(),
                }),
            )
                .into_response();
        }
    }

    let event: RegulatorEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            // Unknown event kinds land here too: logged and rejected, never
            // silently processed.
            warn!(error = %err, "malformed or unknown regulator event; rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "unrecognized event payload".to_string(),
                }),
            )
                .into_response();
        }
    };

    let shared = Arc::clone(&st);
    let to_process = event.clone();
    let result = tokio::task::spawn_blocking(move || {
        let activation = ActivationService::new(
            &*shared.store,
            &*shared.identity,
            &*shared.billing,
            &*shared.notifier,
            shared.config.billing.currency.clone(),
        );
        let processor = WebhookProcessor::new(&*shared.store, &activation, &*shared.notifier);
        processor.process(&to_process, Utc::now())
    })
    .await;

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(PipelineError::Validation(msg))) => {
            warn!(error = %msg, "regulator webhook refused");
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: msg })).into_response();
        }
        Ok(Err(err)) => {
            warn!(error = %err, "regulator webhook processing failed; sender will retry");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "webhook processing failed".to_string(),
                }),
            )
                .into_response();
        }
        Err(join_err) => {
            warn!(error = %join_err, "webhook task panicked");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "webhook processing failed".to_string(),
                }),
            )
                .into_response();
        }
    };

    let outcome_name = match outcome {
        WebhookOutcome::Applied => "applied",
        WebhookOutcome::Duplicate => "duplicate",
        WebhookOutcome::Conflict => "conflict",
    };
    st.journal_append(
        &format!("submission:{}", event.submission_id()),
        "webhook_processed",
        json!({ "kind": event.kind(), "outcome": outcome_name }),
    );
    let _ = st.bus.send(BusMsg::WebhookProcessed {
        submission_id: event.submission_id(),
        kind: event.kind().to_string(),
        outcome: outcome_name.to_string(),
    });
    info!(
        submission_id = %event.submission_id(),
        kind = event.kind(),
        outcome = outcome_name,
        "regulator webhook absorbed"
    );

    (
        StatusCode::OK,
        Json(WebhookAck {
            outcome: outcome_name.to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/orders/{id}/status
// ---------------------------------------------------------------------------

pub(crate) async fn order_status(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    // Store work runs on a blocking thread: the durable store drives its
    // queries to completion synchronously.
    let shared = Arc::clone(&st);
    match tokio::task::spawn_blocking(move || order_status_blocking(&shared, id)).await {
        Ok(resp) => resp,
        Err(join_err) => internal_error(join_err),
    }
}

fn order_status_blocking(st: &AppState, id: Uuid) -> Response {
    match st.store.load_order(id) {
        Ok(Some(order)) => (
            StatusCode::OK,
            Json(OrderStatusResponse {
                order_id: order.id,
                current_status: order.status.as_str().to_string(),
                allowed_next_statuses: allowed_names(order.status),
            }),
        )
            .into_response(),
        Ok(None) => order_not_found(id),
        Err(err) => internal_error(err),
    }
}

// ---------------------------------------------------------------------------
// PATCH /v1/orders/{id}/status
// ---------------------------------------------------------------------------

/// Admin transition surface. An illegal edge returns 409 with the allowed
/// set; a failed precondition (missing cancel reason / scheduled date /
/// regulatory gate) returns 422, also with the allowed set.
pub(crate) async fn order_status_patch(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<PatchOrderStatusRequest>,
) -> Response {
    let shared = Arc::clone(&st);
    match tokio::task::spawn_blocking(move || patch_order_blocking(&shared, id, req)).await {
        Ok(resp) => resp,
        Err(join_err) => internal_error(join_err),
    }
}

fn patch_order_blocking(st: &AppState, id: Uuid, req: PatchOrderStatusRequest) -> Response {
    let order = match st.store.load_order(id) {
        Ok(Some(order)) => order,
        Ok(None) => return order_not_found(id),
        Err(err) => return internal_error(err),
    };

    let Some(target) = OrderStatus::parse(&req.status) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("unknown status '{}'", req.status),
            }),
        )
            .into_response();
    };

    let submission = match st.store.find_submission_by_order(id) {
        Ok(s) => s,
        Err(err) => return internal_error(err),
    };
    let regulatory_approved = submission
        .as_ref()
        .is_some_and(|s| s.status == SubmissionStatus::Approved);

    let ctx = TransitionContext {
        reason: req.notes.clone(),
        changed_by: req.changed_by.clone(),
        automated: false,
        customer_notified: false,
        scheduled_date: req.scheduled_date,
        regulatory_approved,
        admin_bypass: req.admin_bypass,
    };

    let change = match plan_transition(order.id, order.status, target, &ctx, Utc::now()) {
        Ok(change) => change,
        Err(err @ TransitionError::Illegal { from, .. }) => {
            return (
                StatusCode::CONFLICT,
                Json(TransitionRefusedResponse {
                    error: err.to_string(),
                    current_status: from.as_str().to_string(),
                    allowed_next_statuses: allowed_names(from),
                }),
            )
                .into_response();
        }
        Err(precondition) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(TransitionRefusedResponse {
                    error: precondition.to_string(),
                    current_status: order.status.as_str().to_string(),
                    allowed_next_statuses: allowed_names(order.status),
                }),
            )
                .into_response();
        }
    };

    let mut updated = match st.store.apply_transition(&change) {
        Ok(updated) => updated,
        Err(PipelineError::Conflict(detail)) => {
            // Lost a race with another caller; report the fresh state.
            let current = st
                .store
                .load_order(id)
                .ok()
                .flatten()
                .map(|o| o.status)
                .unwrap_or(order.status);
            return (
                StatusCode::CONFLICT,
                Json(TransitionRefusedResponse {
                    error: detail,
                    current_status: current.as_str().to_string(),
                    allowed_next_statuses: allowed_names(current),
                }),
            )
                .into_response();
        }
        Err(err) => return internal_error(err),
    };

    match target {
        OrderStatus::InstallationScheduled => {
            updated.scheduled_date = req.scheduled_date;
            updated.scheduled_time_slot = req.scheduled_time_slot.clone();
            if let Err(err) = st.store.save_order(&updated) {
                warn!(order_id = %id, error = %err, "failed to persist schedule fields");
            }
        }
        OrderStatus::InstallationCompleted => {
            let sla = SlaTracking {
                order_id: updated.id,
                order_placed_at: updated.created_at,
                installation_completed_at: Some(Utc::now()),
                activated_at: st
                    .store
                    .sla_tracking(updated.id)
                    .ok()
                    .flatten()
                    .and_then(|s| s.activated_at),
            };
            if let Err(err) = st.store.upsert_sla_tracking(&sla) {
                warn!(order_id = %id, error = %err, "failed to stamp installation completion");
            }
        }
        OrderStatus::Cancelled => {
            // Cancellation never tries to "un-submit" a regulatory filing;
            // that lifecycle belongs to the regulator. We just log it.
            if let Some(sub) = &submission {
                if sub.status == SubmissionStatus::Submitted {
                    warn!(
                        order_id = %id,
                        tracking_id = %sub.regulator_tracking_id,
                        "order cancelled with a filing still pending at the regulator"
                    );
                }
            }
        }
        _ => {}
    }

    st.journal_append(
        &format!("order:{id}"),
        "status_transition",
        json!({
            "from": change.old_status.as_str(),
            "to": change.new_status.as_str(),
            "reason": change.reason,
            "changed_by": change.changed_by,
            "automated": change.automated,
        }),
    );
    let _ = st.bus.send(BusMsg::StatusChanged {
        order_id: updated.id,
        old_status: change.old_status.as_str().to_string(),
        new_status: change.new_status.as_str().to_string(),
    });

    (
        StatusCode::OK,
        Json(OrderStatusResponse {
            order_id: updated.id,
            current_status: updated.status.as_str().to_string(),
            allowed_next_statuses: allowed_names(updated.status),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/orders/{id}/activate
// ---------------------------------------------------------------------------

/// Manual admin retrigger of activation. Concurrent with a webhook-driven
/// attempt this is safe: the store's compare-and-swap lets exactly one
/// caller win and the loser observes `already_active`.
pub(crate) async fn order_activate(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    let shared = Arc::clone(&st);
    let result = tokio::task::spawn_blocking(move || {
        let activation = ActivationService::new(
            &*shared.store,
            &*shared.identity,
            &*shared.billing,
            &*shared.notifier,
            shared.config.billing.currency.clone(),
        );
        activation.activate(id, Utc::now())
    })
    .await;

    match result {
        Ok(Ok(ActivationOutcome::Activated { account_number })) => {
            st.journal_append(
                &format!("order:{id}"),
                "activated",
                json!({ "account_number": account_number }),
            );
            (
                StatusCode::OK,
                Json(ActivateResponse {
                    outcome: "activated".to_string(),
                    account_number: Some(account_number),
                    status: None,
                }),
            )
                .into_response()
        }
        Ok(Ok(ActivationOutcome::AlreadyActive)) => (
            StatusCode::OK,
            Json(ActivateResponse {
                outcome: "already_active".to_string(),
                account_number: None,
                status: None,
            }),
        )
            .into_response(),
        Ok(Ok(ActivationOutcome::NotReady { status })) => (
            StatusCode::CONFLICT,
            Json(ActivateResponse {
                outcome: "not_ready".to_string(),
                account_number: None,
                status: Some(status.as_str().to_string()),
            }),
        )
            .into_response(),
        Ok(Err(PipelineError::Validation(msg))) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse { error: msg }),
        )
            .into_response(),
        Ok(Err(err)) => internal_error(err),
        Err(join_err) => internal_error(join_err),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/orders/stream (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(
    State(st): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = st.bus.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(bus_msg) => Event::default().json_data(&bus_msg).ok().map(Ok),
            // Lagged receivers just skip; the next event resyncs them.
            Err(_) => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// Shared error responses
// ---------------------------------------------------------------------------

fn order_not_found(id: Uuid) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("order {id} not found"),
        }),
    )
        .into_response()
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    warn!(error = %err, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal error".to_string(),
        }),
    )
        .into_response()
}
