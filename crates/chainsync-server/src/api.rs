//! HTTP query API: `GET /events`, `GET /health`, and the router.

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use chainsync_core::buffer::EventQuery;

use crate::state::AppState;
use crate::stream::ws_handler;

/// Build the router with tracing and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", get(events_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn events_handler(
    State(state): State<AppState>,
    Query(mut query): Query<EventQuery>,
) -> Json<Value> {
    let limit = query
        .limit
        .unwrap_or(state.info.default_query_limit)
        .min(state.info.max_stored_events);
    query.limit = Some(limit);

    let buffer = state.buffer.read().await;
    let events = buffer.query(&query);
    let total = buffer.len();
    drop(buffer);

    Json(json!({
        "events": events,
        "meta": {
            "count": events.len(),
            "total": total,
            "limit": limit,
            "filters": {
                "address": query.address,
                "contract": query.contract,
                "type": query.event_type,
            },
        },
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let status = state.status.status();
    let total_events = state.buffer.read().await.len();
    let info = &state.info;
    Json(json!({
        "status": if status.last_error.is_some() { "degraded" } else { "ok" },
        "chainId": info.chain_id,
        "rpcUrl": info.rpc_url,
        "trackedContracts": info.tracked_contracts,
        "lastSyncedBlock": status.last_synced_block,
        "totalEvents": total_events,
        "pollIntervalMs": info.poll_interval_ms,
        "streamClients": state.stream_clients(),
        "sync": status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    use chainsync_core::buffer::EventBuffer;
    use chainsync_core::config::SyncConfig;
    use chainsync_core::status::SyncStatus;
    use chainsync_core::types::{BlockchainEvent, ContractWatch, EventType};

    use crate::state::{NodeInfo, StatusSource};

    const A: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    struct FixedStatus(SyncStatus);

    impl StatusSource for FixedStatus {
        fn status(&self) -> SyncStatus {
            self.0.clone()
        }
    }

    fn event(block: u64, name: &str, ty: EventType) -> BlockchainEvent {
        let tx = format!("0x{block:064x}");
        BlockchainEvent {
            id: BlockchainEvent::make_id(&tx, 0),
            block_number: block,
            log_index: 0,
            transaction_hash: tx,
            contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".into(),
            contract_tag: "token".into(),
            event_name: name.into(),
            event_type: ty,
            timestamp: 1_700_000_000,
            from: None,
            to: None,
            amount: None,
            amount0: None,
            amount1: None,
            args: Default::default(),
        }
    }

    fn app(max_stored: usize) -> AppState {
        let mut cfg = SyncConfig::new(
            "http://localhost:8545",
            vec![ContractWatch::new("0x5FbDB2315678afecb367f032d93F642f64180aa3", "token")],
        );
        cfg.max_stored_events = max_stored;
        cfg.server.default_query_limit = 2;

        let mut buffer = EventBuffer::new(max_stored);
        let mut swap = event(10, "SwapExecuted", EventType::Swap);
        swap.from = Some(A.into());
        buffer.append(swap);
        let mut transfer = event(11, "Transfer", EventType::Transfer);
        transfer.to = Some(A.into());
        buffer.append(transfer);
        buffer.append(event(12, "Approval", EventType::Approval));

        let status = SyncStatus {
            last_synced_block: Some(12),
            ..Default::default()
        };
        AppState::new(
            NodeInfo::from_config(&cfg),
            Arc::new(RwLock::new(buffer)),
            Arc::new(FixedStatus(status)),
            16,
        )
    }

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
        let resp = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn events_filtered_by_address_and_type() {
        let (status, body) = get_json(app(100), &format!("/events?address={}&limit=10", A.to_lowercase())).await;
        assert_eq!(status, StatusCode::OK);
        let events = body["events"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["eventName"], "Transfer");
        assert_eq!(events[1]["eventType"], "Swap");

        let (_, body) = get_json(app(100), "/events?type=swap").await;
        let events = body["events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["eventName"], "SwapExecuted");
        assert_eq!(body["meta"]["filters"]["type"], "swap");
    }

    #[tokio::test]
    async fn limit_defaults_and_is_clamped() {
        let (_, body) = get_json(app(100), "/events").await;
        assert_eq!(body["meta"]["limit"], 2);
        assert_eq!(body["meta"]["count"], 2);
        assert_eq!(body["meta"]["total"], 3);
        assert_eq!(body["events"][0]["blockNumber"], 12);

        let (_, body) = get_json(app(3), "/events?limit=5000").await;
        assert_eq!(body["meta"]["limit"], 3);
    }

    #[tokio::test]
    async fn health_reports_sync_state() {
        let (status, body) = get_json(app(100), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["chainId"], 1);
        assert_eq!(body["rpcUrl"], "http://localhost:8545");
        assert_eq!(body["trackedContracts"][0]["tag"], "token");
        assert_eq!(body["lastSyncedBlock"], 12);
        assert_eq!(body["totalEvents"], 3);
        assert_eq!(body["pollIntervalMs"], 5000);
    }

    #[tokio::test]
    async fn bad_limit_is_rejected() {
        let resp = router(app(100))
            .oneshot(Request::builder().uri("/events?limit=abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
