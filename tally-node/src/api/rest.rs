use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use tally_common::{
    env::{
        operation::OperationPayload,
        order::{CancelOrderPayload, CreateOrderPayload, OrderStatus, ProcessPaymentPayload, UpdateStatusPayload},
        vote_data::{CommitNotice, VoteRequest, VoteResponse},
    },
    error::{Result, TallyError},
    utils::time,
};
use tally_consensus::{ClusterStatus, Coordinator, OperationRecord, ProposalOutcome};
use tally_ledger::Order;

use crate::api::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    /// `None` when no Prometheus recorder was installed (tests).
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

#[derive(Deserialize, Default)]
struct CancelBody {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct PaymentBody {
    amount: f64,
}

#[derive(Serialize)]
struct OrderList {
    orders: Vec<Order>,
    count: usize,
    node: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/orders", post(create_order).get(list_orders))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/status", put(update_status))
        .route("/api/orders/{id}/cancel", post(cancel_order))
        .route("/api/orders/{id}/payment", post(process_payment))
        .route("/consensus/vote", post(vote))
        .route("/consensus/commit", post(commit))
        .route("/consensus/status", get(cluster_status))
        .route("/consensus/operations/{id}", get(get_operation))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn start_rest_api(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = router(state);
    info!("REST API listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs a proposal and maps it to 2xx on commit or 409 with the ledger on reject.
async fn run_proposal(
    state: &AppState,
    payload: OperationPayload,
    success: StatusCode,
) -> std::result::Result<(StatusCode, Json<ProposalOutcome>), ApiError> {
    // roda fora do handler: cliente desconectado não aborta a rodada
    let coordinator = Arc::clone(&state.coordinator);
    let outcome = tokio::spawn(async move { coordinator.propose(payload).await })
        .await
        .map_err(|e| TallyError::Other(format!("proposal task failed: {e}")))??;
    if outcome.is_committed() {
        Ok((success, Json(outcome)))
    } else {
        Err(ApiError::rejected(outcome))
    }
}

async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderPayload>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    run_proposal(&state, OperationPayload::CreateOrder(payload), StatusCode::CREATED).await
}

async fn list_orders(State(state): State<AppState>) -> Json<OrderList> {
    let orders = state.coordinator.list_orders().await;
    Json(OrderList {
        count: orders.len(),
        orders,
        node: state.coordinator.local_id().to_string(),
    })
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Order>, ApiError> {
    state
        .coordinator
        .get_order(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("order {id} not found")))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let status: OrderStatus = body.status.parse()?;
    let payload = OperationPayload::UpdateStatus(UpdateStatusPayload { order_id: id, status });
    run_proposal(&state, payload, StatusCode::OK).await
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> std::result::Result<impl IntoResponse, ApiError> {
    // corpo opcional
    let body: CancelBody = if body.iter().all(u8::is_ascii_whitespace) {
        CancelBody::default()
    } else {
        serde_json::from_slice(&body).map_err(TallyError::from)?
    };
    let payload = OperationPayload::CancelOrder(CancelOrderPayload { order_id: id, reason: body.reason });
    run_proposal(&state, payload, StatusCode::OK).await
}

async fn process_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PaymentBody>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let payload = OperationPayload::ProcessPayment(ProcessPaymentPayload { order_id: id, amount: body.amount });
    run_proposal(&state, payload, StatusCode::OK).await
}

async fn vote(
    State(state): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> std::result::Result<Json<VoteResponse>, ApiError> {
    let response = state.coordinator.cast_vote(&request).await?;
    Ok(Json(response))
}

async fn commit(
    State(state): State<AppState>,
    Json(notice): Json<CommitNotice>,
) -> std::result::Result<Json<OperationRecord>, ApiError> {
    let record = state.coordinator.apply_commit(notice).await?;
    Ok(Json(record))
}

async fn cluster_status(State(state): State<AppState>) -> Json<ClusterStatus> {
    Json(state.coordinator.cluster_status().await)
}

async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<OperationRecord>, ApiError> {
    state
        .coordinator
        .get_operation(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("operation {id} not found")))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "node": state.coordinator.local_id(),
        "degradedAuth": state.coordinator.is_degraded(),
        "timestamp": time::now(),
    }))
}

async fn render_metrics(State(state): State<AppState>) -> String {
    state.metrics.as_ref().map(PrometheusHandle::render).unwrap_or_default()
}
