//! Axum router and all HTTP handlers for mpx-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. The caller identity comes from the `x-user-id` and
//! `x-user-role` headers, set by the authenticating gateway in front of
//! the daemon.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use mpx_notify::Notification;
use mpx_schemas::{Actor, Role};
use mpx_workflow::{NewRfq, WorkflowError};

use crate::{
    api_types::{
        DispatchCounters, ErrorResponse, HealthResponse, OrderResponse, PaymentBody,
        QuotationResponse, RejectRequest, RfqResponse, SubmitQuotationRequest, TransitionBody,
    },
    state::{uptime_secs, AppState},
};

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_ROLE: &str = "x-user-role";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are not applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/rfqs", post(create_rfq))
        .route("/v1/rfqs/:rfq_id", get(get_rfq))
        .route("/v1/rfqs/:rfq_id/close", post(close_rfq))
        .route("/v1/rfqs/:rfq_id/cancel", post(cancel_rfq))
        .route(
            "/v1/rfqs/:rfq_id/quotations",
            get(list_quotations).post(submit_quotation),
        )
        .route("/v1/rfqs/:rfq_id/reject-remaining", post(reject_remaining))
        .route("/v1/quotations/:quotation_id", get(get_quotation))
        .route("/v1/quotations/:quotation_id/accept", post(accept_quotation))
        .route("/v1/quotations/:quotation_id/reject", post(reject_quotation))
        .route("/v1/orders/:order_id", get(get_order))
        .route("/v1/orders/:order_id/transition", post(transition_order))
        .route("/v1/orders/:order_id/payment", post(update_payment))
        .route("/v1/users/:user_id/orders", get(list_orders_for_user))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors and caller identity
// ---------------------------------------------------------------------------

/// A refused request: status code plus JSON body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                current_state: None,
            },
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let status = match &err {
            WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkflowError::Authorization => StatusCode::FORBIDDEN,
            WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
            WorkflowError::InvalidState { .. } => StatusCode::CONFLICT,
            WorkflowError::TransactionConflict { .. } => StatusCode::SERVICE_UNAVAILABLE,
            WorkflowError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %err, "request failed");
        }
        Self {
            status,
            body: ErrorResponse {
                error: err.to_string(),
                current_state: err.current_state().map(str::to_string),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `Json` whose rejections (malformed body, wrong types, missing
/// non-optional fields) answer 400 with an [`ErrorResponse`] body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

fn caller(headers: &HeaderMap) -> ApiResult<Actor> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let (Some(id), Some(role)) = (header(HEADER_USER_ID), header(HEADER_USER_ROLE)) else {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "missing caller identity"));
    };
    let role = match role {
        "shipowner" => Role::Shipowner,
        "supplier" => Role::Supplier,
        "admin" => Role::Admin,
        other => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("unknown role '{other}'"),
            ))
        }
    };
    Ok(Actor::new(id, role))
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
            uptime_secs: uptime_secs(),
            notifications: DispatchCounters {
                delivered: st.dispatch.delivered(),
                failed: st.dispatch.failed(),
                dropped: st.dispatch.dropped(),
            },
        }),
    )
}

// ---------------------------------------------------------------------------
// RFQs
// ---------------------------------------------------------------------------

pub(crate) async fn create_rfq(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<NewRfq>,
) -> ApiResult<(StatusCode, Json<RfqResponse>)> {
    let actor = caller(&headers)?;
    let now = Utc::now();
    let rfq = st.workflow.rfqs().create(&actor, body, now).await?;
    info!(rfq_id = %rfq.rfq_id, "rfq/create");
    Ok((StatusCode::CREATED, Json(RfqResponse::new(rfq, now))))
}

pub(crate) async fn get_rfq(
    State(st): State<Arc<AppState>>,
    Path(rfq_id): Path<String>,
) -> ApiResult<Json<RfqResponse>> {
    let rfq = st.workflow.rfqs().get(&rfq_id).await?;
    Ok(Json(RfqResponse::new(rfq, Utc::now())))
}

pub(crate) async fn close_rfq(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(rfq_id): Path<String>,
) -> ApiResult<Json<RfqResponse>> {
    let actor = caller(&headers)?;
    let now = Utc::now();
    let rfq = st.workflow.rfqs().close(&rfq_id, &actor, now).await?;
    Ok(Json(RfqResponse::new(rfq, now)))
}

pub(crate) async fn cancel_rfq(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(rfq_id): Path<String>,
) -> ApiResult<Json<RfqResponse>> {
    let actor = caller(&headers)?;
    let now = Utc::now();
    let rfq = st.workflow.rfqs().cancel(&rfq_id, &actor, now).await?;
    Ok(Json(RfqResponse::new(rfq, now)))
}

pub(crate) async fn reject_remaining(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(rfq_id): Path<String>,
    body: Option<Json<RejectRequest>>,
) -> ApiResult<Json<Vec<QuotationResponse>>> {
    let actor = caller(&headers)?;
    let reason = body.and_then(|Json(b)| b.reason);
    let rejected = st
        .workflow
        .quotations()
        .reject_remaining(&rfq_id, &actor, reason.as_deref(), Utc::now())
        .await?;
    Ok(Json(rejected.into_iter().map(Into::into).collect()))
}

// ---------------------------------------------------------------------------
// Quotations
// ---------------------------------------------------------------------------

pub(crate) async fn list_quotations(
    State(st): State<Arc<AppState>>,
    Path(rfq_id): Path<String>,
) -> ApiResult<Json<Vec<QuotationResponse>>> {
    let quotations = st.workflow.quotations().list_for_rfq(&rfq_id).await?;
    Ok(Json(quotations.into_iter().map(Into::into).collect()))
}

pub(crate) async fn submit_quotation(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(rfq_id): Path<String>,
    ApiJson(body): ApiJson<SubmitQuotationRequest>,
) -> ApiResult<(StatusCode, Json<QuotationResponse>)> {
    let actor = caller(&headers)?;
    let bid = body.into_bid()?;
    let q = st
        .workflow
        .quotations()
        .submit(&rfq_id, &actor, &bid, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(q.into())))
}

pub(crate) async fn get_quotation(
    State(st): State<Arc<AppState>>,
    Path(quotation_id): Path<String>,
) -> ApiResult<Json<QuotationResponse>> {
    let q = st.workflow.quotations().get(&quotation_id).await?;
    Ok(Json(q.into()))
}

pub(crate) async fn accept_quotation(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(quotation_id): Path<String>,
) -> ApiResult<(StatusCode, Json<OrderResponse>)> {
    let actor = caller(&headers)?;
    let order = st
        .workflow
        .quotations()
        .accept(&quotation_id, &actor, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

pub(crate) async fn reject_quotation(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(quotation_id): Path<String>,
    body: Option<Json<RejectRequest>>,
) -> ApiResult<Json<QuotationResponse>> {
    let actor = caller(&headers)?;
    let reason = body.and_then(|Json(b)| b.reason);
    let q = st
        .workflow
        .quotations()
        .reject(&quotation_id, &actor, reason.as_deref(), Utc::now())
        .await?;
    Ok(Json(q.into()))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub(crate) async fn get_order(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<OrderResponse>> {
    let order = st.workflow.orders().get(&order_id).await?;
    Ok(Json(order.into()))
}

pub(crate) async fn transition_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    ApiJson(body): ApiJson<TransitionBody>,
) -> ApiResult<Json<OrderResponse>> {
    let actor = caller(&headers)?;
    let req = body.into_request(order_id);
    let order = st
        .workflow
        .orders()
        .transition(&req, &actor, Utc::now())
        .await?;
    Ok(Json(order.into()))
}

pub(crate) async fn update_payment(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    ApiJson(body): ApiJson<PaymentBody>,
) -> ApiResult<Json<OrderResponse>> {
    let actor = caller(&headers)?;
    let req = body.into_request(order_id);
    let order = st
        .workflow
        .orders()
        .update_payment(&req, &actor, Utc::now())
        .await?;
    Ok(Json(order.into()))
}

/// Orders are visible only to their own parties and admins.
pub(crate) async fn list_orders_for_user(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<OrderResponse>>> {
    let actor = caller(&headers)?;
    if actor.id != user_id && actor.role != Role::Admin {
        return Err(WorkflowError::Authorization.into());
    }
    let orders = st.workflow.orders().list_for_user(&user_id).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StreamQuery {
    #[serde(default)]
    user_id: Option<String>,
}

/// Only admins may watch another user's events (or everyone's, without
/// `?userId=`); every other caller sees their own.
pub(crate) async fn stream(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<StreamQuery>,
) -> ApiResult<Response> {
    let actor = caller(&headers)?;
    let user_id = match actor.role {
        Role::Admin => q.user_id,
        Role::Shipowner | Role::Supplier => Some(actor.id),
    };

    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let events = notifications_to_sse(st.events.subscribe(), user_id);

    Ok((headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response())
}

fn notifications_to_sse(
    rx: broadcast::Receiver<Notification>,
    user_id: Option<String>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(move |msg| {
        let user_id = user_id.clone();
        async move {
            match msg {
                Ok(n) => {
                    if user_id.as_deref().is_some_and(|u| u != n.user_id) {
                        return None;
                    }
                    let data = serde_json::to_string(&n).ok()?;
                    Some(Ok(Event::default().event(n.kind.as_str()).data(data)))
                }
                Err(_) => None, // lagged / closed
            }
        }
    })
}
