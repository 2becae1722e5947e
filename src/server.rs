//! HTTP surface for balance queries, health and metrics

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::QueryError;
use crate::ledger::CurrencyBalance;
use crate::query::MarketBalances;
use crate::AppState;

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match self {
            QueryError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::InvalidMarket(_) => StatusCode::BAD_REQUEST,
            QueryError::UnknownCurrency(_) => StatusCode::NOT_FOUND,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/balances", get(list_balances))
        .route("/balances/:market", get(get_balances))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the listener fails
pub async fn serve(state: Arc<AppState>, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Starting query server");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn get_balances(
    State(state): State<Arc<AppState>>,
    Path(market): Path<String>,
) -> Result<Json<MarketBalances>, QueryError> {
    state.query.get_balances(&market).map(Json)
}

async fn list_balances(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CurrencyBalance>>, QueryError> {
    state.query.list_balances().map(Json)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let ready = state.store.is_ready();
    let status = if ready { "healthy" } else { "starting" };
    let feed = *state.feed_state.borrow();
    Json(serde_json::json!({
        "status": status,
        "component": "balance-ledger",
        "ready": ready,
        "feed": feed,
        "currencies": state.store.len(),
        "invariant_violations": state.store.violation_count(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => text.into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
