//! Live event stream: a `state` snapshot on connect, then every engine event

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use engine::EngineEvent;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before taking the snapshot so no transition falls in between
    let mut events = state.engine.broadcaster().subscribe();
    info!(
        subscribers = state.engine.broadcaster().subscriber_count(),
        "WebSocket client connected"
    );

    if let Some(snapshot) = state.engine.snapshot().await {
        let welcome = EngineEvent::State(Box::new(snapshot));
        if !send_event(&mut sender, &welcome).await {
            return;
        }
    }

    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(Message::Text(text)) => debug!(len = text.len(), "Ignoring client message"),
                Err(e) => {
                    warn!(error = %e, "WebSocket receive error");
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        _ = &mut receive_task => send_task.abort(),
        _ = &mut send_task => receive_task.abort(),
    }
    info!("WebSocket client disconnected");
}

async fn send_event<S>(sender: &mut S, event: &EngineEvent) -> bool
where
    S: Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!(event = event.name(), error = %e, "Failed to serialize event");
            return true;
        }
    };
    sender.send(Message::Text(text)).await.is_ok()
}
