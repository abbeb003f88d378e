//! In-process scenario tests for mpx-daemon HTTP endpoints.
//!
//! The router is driven with `tower::ServiceExt::oneshot`; no socket is
//! bound.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use mpx_daemon::{routes, state};
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_router() -> axum::Router {
    routes::build_router(Arc::new(state::AppState::in_memory()))
}

async fn call(router: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("body is not valid JSON")
    };
    (status, json)
}

fn get(uri: &str, who: Option<(&str, &str)>) -> Request<Body> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some((id, role)) = who {
        b = b.header("x-user-id", id).header("x-user-role", role);
    }
    b.body(Body::empty()).unwrap()
}

fn post(uri: &str, who: Option<(&str, &str)>, body: Value) -> Request<Body> {
    let mut b = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some((id, role)) = who {
        b = b.header("x-user-id", id).header("x-user-role", role);
    }
    b.body(Body::from(body.to_string())).unwrap()
}

const OWNER: Option<(&str, &str)> = Some(("so-1", "shipowner"));
const SUPPLIER: Option<(&str, &str)> = Some(("sup-1", "supplier"));

fn rfq_body() -> Value {
    json!({
        "title": "Lube oil 2000l",
        "description": "Delivery alongside at Rotterdam",
        "category": "lubricants",
        "vesselInfo": {"name": "MV Nordic Star", "imoNumber": "9387421"},
        "deadline": (Utc::now() + Duration::days(3)).to_rfc3339(),
    })
}

async fn open_rfq(router: &axum::Router) -> String {
    let (status, json) = call(router, post("/v1/rfqs", OWNER, rfq_body())).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["rfqId"].as_str().unwrap().to_string()
}

async fn quote(router: &axum::Router, rfq_id: &str, who: Option<(&str, &str)>, price: f64) -> String {
    let uri = format!("/v1/rfqs/{rfq_id}/quotations");
    let (status, json) = call(router, post(&uri, who, json!({"price": price, "currency": "eur"}))).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["quotationId"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let router = make_router();
    let (status, json) = call(&router, get("/v1/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "mpx-daemon");
    assert_eq!(json["notifications"]["failed"], 0);
}

// ---------------------------------------------------------------------------
// RFQ → quotation → order over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn award_flow_over_http() {
    let router = make_router();
    let rfq_id = open_rfq(&router).await;

    let (status, rfq) = call(&router, get(&format!("/v1/rfqs/{rfq_id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rfq["status"], "open");
    assert_eq!(rfq["deadlinePassed"], false);
    assert_eq!(rfq["vesselInfo"]["imoNumber"], "9387421");

    let q1 = quote(&router, &rfq_id, SUPPLIER, 1250.5).await;
    let q2 = quote(&router, &rfq_id, Some(("sup-2", "supplier")), 1190.0).await;

    let (status, list) = call(&router, get(&format!("/v1/rfqs/{rfq_id}/quotations"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    let first = list.iter().find(|q| q["quotationId"] == q1.as_str()).unwrap();
    assert_eq!(first["price"], 1250.5);
    assert_eq!(first["priceMicros"], 1_250_500_000i64);
    assert_eq!(first["currency"], "EUR");
    assert!(list.iter().any(|q| q["quotationId"] == q2.as_str()));

    let (status, order) = call(&router, post(&format!("/v1/quotations/{q1}/accept"), OWNER, json!({}))).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["status"], "pending_supplier_approval");
    assert_eq!(order["paymentStatus"], "pending");
    assert_eq!(order["amount"], 1250.5);
    let order_id = order["orderId"].as_str().unwrap().to_string();

    // the rfq is awarded; the losing bid is still pending until rejected
    let (_, rfq) = call(&router, get(&format!("/v1/rfqs/{rfq_id}"), None)).await;
    assert_eq!(rfq["status"], "awarded");
    assert_eq!(rfq["awardedQuotationId"], q1.as_str());

    let (status, rejected) = call(
        &router,
        post(&format!("/v1/rfqs/{rfq_id}/reject-remaining"), OWNER, json!({"reason": "awarded elsewhere"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected.as_array().unwrap().len(), 1);
    assert_eq!(rejected[0]["quotationId"], q2.as_str());
    assert_eq!(rejected[0]["rejectionReason"], "awarded elsewhere");

    // supplier approves
    let (status, order) = call(
        &router,
        post(
            &format!("/v1/orders/{order_id}/transition"),
            SUPPLIER,
            json!({"status": "pending_payment", "requestId": "req-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{order}");
    assert_eq!(order["status"], "pending_payment");
    assert_eq!(order["timeline"].as_array().unwrap().len(), 2);

    // shipowner reports payment
    let (status, order) = call(
        &router,
        post(
            &format!("/v1/orders/{order_id}/payment"),
            OWNER,
            json!({"paymentStatus": "payment_awaiting_confirmation"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{order}");
    assert_eq!(order["paymentStatus"], "payment_awaiting_confirmation");

    let (status, mine) = call(&router, get("/v1/users/sup-1/orders", SUPPLIER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine[0]["orderId"], order_id.as_str());
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn workflow_errors_map_to_status_codes() {
    let router = make_router();
    let rfq_id = open_rfq(&router).await;
    let qid = quote(&router, &rfq_id, SUPPLIER, 99.0).await;

    // 401: no identity
    let (status, _) = call(&router, post("/v1/rfqs", None, rfq_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 400: unknown role, bad price
    let (status, _) = call(&router, post("/v1/rfqs", Some(("x", "captain")), rfq_body())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = call(
        &router,
        post(&format!("/v1/rfqs/{rfq_id}/quotations"), SUPPLIER, json!({"price": -5.0, "currency": "USD"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "price must be positive");

    // 403: suppliers cannot create rfqs; strangers cannot accept
    let (status, body) = call(&router, post("/v1/rfqs", SUPPLIER, rfq_body())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "unauthorized");
    let (status, _) = call(
        &router,
        post(&format!("/v1/quotations/{qid}/accept"), Some(("so-2", "shipowner")), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // 404
    let (status, _) = call(&router, get("/v1/orders/does-not-exist", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // 409 carries the current state
    let (status, order) = call(&router, post(&format!("/v1/quotations/{qid}/accept"), OWNER, json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = order["orderId"].as_str().unwrap();
    let (status, body) = call(
        &router,
        post(&format!("/v1/orders/{order_id}/transition"), SUPPLIER, json!({"status": "shipped"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["currentState"], "pending_supplier_approval");

    let (status, body) = call(&router, post(&format!("/v1/rfqs/{rfq_id}/close"), OWNER, json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["currentState"], "awarded");

    // other users' order lists are private
    let (status, _) = call(&router, get("/v1/users/sup-1/orders", Some(("sup-2", "supplier")))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reject_without_body_and_cancel() {
    let router = make_router();
    let rfq_id = open_rfq(&router).await;
    let qid = quote(&router, &rfq_id, SUPPLIER, 10.0).await;

    let req = Request::builder()
        .method("POST")
        .uri(format!("/v1/quotations/{qid}/reject"))
        .header("x-user-id", "so-1")
        .header("x-user-role", "shipowner")
        .body(Body::empty())
        .unwrap();
    let (status, q) = call(&router, req).await;
    assert_eq!(status, StatusCode::OK, "{q}");
    assert_eq!(q["status"], "rejected");

    let (status, rfq) = call(&router, post(&format!("/v1/rfqs/{rfq_id}/cancel"), OWNER, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rfq["status"], "cancelled");
    assert_eq!(rfq["quotationCount"], 1);
}

// ---------------------------------------------------------------------------
// Malformed and incomplete bodies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_fields_are_validation_errors() {
    let router = make_router();
    let rfq_id = open_rfq(&router).await;

    let (status, body) = call(
        &router,
        post(&format!("/v1/rfqs/{rfq_id}/quotations"), SUPPLIER, json!({"currency": "USD"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "price is required");

    let (status, body) = call(
        &router,
        post(&format!("/v1/rfqs/{rfq_id}/quotations"), SUPPLIER, json!({"price": 10.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "currency is required");

    let mut no_title = rfq_body();
    no_title.as_object_mut().unwrap().remove("title");
    let (status, body) = call(&router, post("/v1/rfqs", OWNER, no_title)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "title is required");

    let mut no_category = rfq_body();
    no_category.as_object_mut().unwrap().remove("category");
    let (status, body) = call(&router, post("/v1/rfqs", OWNER, no_category)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "category is required");
}

#[tokio::test]
async fn undecodable_bodies_answer_400_with_json_error() {
    let router = make_router();

    let mut no_deadline = rfq_body();
    no_deadline.as_object_mut().unwrap().remove("deadline");
    let (status, body) = call(&router, post("/v1/rfqs", OWNER, no_deadline)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("deadline"), "{body}");

    let req = Request::builder()
        .method("POST")
        .uri("/v1/rfqs")
        .header("content-type", "application/json")
        .header("x-user-id", "so-1")
        .header("x-user-role", "shipowner")
        .body(Body::from("{\"title\": "))
        .unwrap();
    let (status, body) = call(&router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = call(
        &router,
        post("/v1/orders/any/transition", SUPPLIER, json!({"status": "teleported"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// ---------------------------------------------------------------------------
// GET /v1/stream
// ---------------------------------------------------------------------------

/// Next SSE frame carrying a `data:` line; keep-alive comments are skipped.
async fn next_event(body: &mut Body) -> String {
    loop {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), body.frame())
            .await
            .expect("no event within 5s")
            .expect("stream ended")
            .expect("body error");
        if let Ok(data) = frame.into_data() {
            let text = String::from_utf8_lossy(&data).to_string();
            if text.lines().any(|l| l.starts_with("data:")) {
                return text;
            }
        }
    }
}

#[tokio::test]
async fn stream_requires_identity() {
    let router = make_router();
    let (status, body) = call(&router, get("/v1/stream", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing caller identity");
}

#[tokio::test]
async fn stream_only_carries_the_callers_events() {
    let router = make_router();

    // asking for someone else's feed is ignored for non-admins
    let resp = router
        .clone()
        .oneshot(get("/v1/stream?userId=sup-1", Some(("sup-2", "supplier"))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let mut events = resp.into_body();

    let rfq_id = open_rfq(&router).await;
    let q1 = quote(&router, &rfq_id, SUPPLIER, 100.0).await;
    let q2 = quote(&router, &rfq_id, Some(("sup-2", "supplier")), 90.0).await;
    for qid in [&q1, &q2] {
        let (status, _) = call(&router, post(&format!("/v1/quotations/{qid}/reject"), OWNER, json!({}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let event = next_event(&mut events).await;
    assert!(event.contains("event: quotation_rejected"), "{event}");
    assert!(event.contains(r#""userId":"sup-2""#), "{event}");
    assert!(event.contains(&q2), "{event}");
    assert!(!event.contains(&q1), "{event}");
}

#[tokio::test]
async fn admin_stream_may_follow_any_user() {
    let router = make_router();
    let resp = router
        .clone()
        .oneshot(get("/v1/stream?userId=sup-1", Some(("ops", "admin"))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let mut events = resp.into_body();

    let rfq_id = open_rfq(&router).await;
    let q1 = quote(&router, &rfq_id, SUPPLIER, 100.0).await;
    let (status, _) = call(&router, post(&format!("/v1/quotations/{q1}/reject"), OWNER, json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let event = next_event(&mut events).await;
    assert!(event.contains(r#""userId":"sup-1""#), "{event}");
    assert!(event.contains(&q1), "{event}");
}
