use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use stepgraph_core::event::EventBus;
use stepgraph_core::types::{FlowEvent, RunId};

/// Stream step events to a single WebSocket client.
///
/// Every `StepCompleted` event is sent as a text frame
/// `{run_id, step, node, tool, state}`; with a filter, only that run's
/// steps are sent. Inbound frames are ignored apart from ping and close.
pub async fn handle_connection(ws: WebSocket, event_bus: Arc<EventBus>, filter: Option<RunId>) {
    let (ws_tx, mut ws_rx) = ws.split();
    let ws_tx = Arc::new(Mutex::new(ws_tx));

    let mut event_rx = event_bus.subscribe();
    let event_ws_tx = ws_tx.clone();
    let event_task = tokio::spawn(async move {
        loop {
            let event = match event_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "WebSocket client lagging, dropped step events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let FlowEvent::StepCompleted(step) = event else {
                continue;
            };
            if filter.as_ref().is_some_and(|id| *id != step.run_id) {
                continue;
            }

            if let Ok(json) = serde_json::to_string(&step) {
                let mut tx = event_ws_tx.lock().await;
                if tx.send(Message::Text(json.into())).await.is_err() {
                    debug!("WebSocket send failed, dropping subscriber");
                    break;
                }
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "WebSocket read error");
                break;
            }
        };

        match msg {
            Message::Close(_) => break,
            Message::Ping(data) => {
                let mut tx = ws_tx.lock().await;
                let _ = tx.send(Message::Pong(data)).await;
            }
            _ => {}
        }
    }

    event_task.abort();
    debug!("Connection closed");
}
