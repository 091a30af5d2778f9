//! Live event stream over WebSocket.
//!
//! Every client receives a `connected` greeting and then each newly
//! synced event as a JSON text frame. Clients that fall behind the
//! broadcast buffer skip the missed events and keep streaming.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::state::AppState;

pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.stream.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx))
}

/// The first frame sent to every client.
pub fn connected_frame() -> String {
    json!({
        "type": "connected",
        "message": "Connected to chainsync event stream",
        "timestamp": Utc::now().to_rfc3339(),
    })
    .to_string()
}

async fn handle_socket(socket: WebSocket, mut rx: broadcast::Receiver<Arc<str>>) {
    let (mut sender, mut receiver) = socket.split();

    if sender.send(Message::Text(connected_frame())).await.is_err() {
        return;
    }
    tracing::debug!("stream client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(json) => {
                    if sender.send(Message::Text(json.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "stream client lagging, events skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Inbound frames are ignored; only a close ends the session.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::debug!("stream client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::RwLock;

    use chainsync_core::buffer::EventBuffer;
    use chainsync_core::config::SyncConfig;
    use chainsync_core::hub::SubscriptionHub;
    use chainsync_core::status::SyncStatus;
    use chainsync_core::types::{BlockchainEvent, EventType};

    use crate::state::{NodeInfo, StatusSource};

    struct Idle;

    impl StatusSource for Idle {
        fn status(&self) -> SyncStatus {
            SyncStatus::default()
        }
    }

    fn state() -> AppState {
        let cfg = SyncConfig::new("http://localhost:8545", vec![]);
        AppState::new(
            NodeInfo::from_config(&cfg),
            Arc::new(RwLock::new(EventBuffer::new(10))),
            Arc::new(Idle),
            8,
        )
    }

    #[test]
    fn connected_frame_shape() {
        let v: serde_json::Value = serde_json::from_str(&connected_frame()).unwrap();
        assert_eq!(v["type"], "connected");
        assert!(v["message"].as_str().unwrap().contains("Connected"));
        let ts = v["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[tokio::test]
    async fn hub_events_reach_stream() {
        let state = state();
        let hub = SubscriptionHub::new(8);
        let _bridge = state.attach(&hub);
        let mut rx = state.stream.subscribe();
        assert_eq!(state.stream_clients(), 1);

        let tx = format!("0x{:064x}", 7);
        let event = BlockchainEvent {
            id: BlockchainEvent::make_id(&tx, 2),
            block_number: 7,
            log_index: 2,
            transaction_hash: tx,
            contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".into(),
            contract_tag: "token".into(),
            event_name: "Transfer".into(),
            event_type: EventType::Transfer,
            timestamp: 1_700_000_084,
            from: None,
            to: None,
            amount: Some("1".into()),
            amount0: None,
            amount1: None,
            args: Default::default(),
        };
        assert_eq!(hub.publish(event), 1);

        let json = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["eventName"], "Transfer");
        assert_eq!(v["blockNumber"], 7);
        assert_eq!(v["amount"], "1");
    }

    #[tokio::test]
    async fn publish_without_clients_is_harmless() {
        let state = state();
        let hub = SubscriptionHub::new(8);
        let _bridge = state.attach(&hub);
        let tx = format!("0x{:064x}", 1);
        let event = BlockchainEvent {
            id: BlockchainEvent::make_id(&tx, 0),
            block_number: 1,
            log_index: 0,
            transaction_hash: tx,
            contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".into(),
            contract_tag: "token".into(),
            event_name: "Approval".into(),
            event_type: EventType::Approval,
            timestamp: 0,
            from: None,
            to: None,
            amount: None,
            amount0: None,
            amount1: None,
            args: Default::default(),
        };
        hub.publish(event);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state.stream_clients(), 0);
    }
}
